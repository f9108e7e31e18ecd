//! TCP-proxy (`-P`): accepts connections on a local address and relays
//! bytes to/from a single fixed destination until either side closes.

use tokio::io::{self};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::{CoreError, CoreResult};

pub async fn serve(local_addr: &str, dest_addr: String) -> CoreResult<()> {
    let listener = TcpListener::bind(local_addr)
        .await
        .map_err(|e| CoreError::Setup(format!("tcp-proxy bind {local_addr}: {e}")))?;

    info!(local_addr, dest = %dest_addr, "tcp-proxy listening");

    loop {
        let (inbound, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("tcp-proxy accept error: {e}");
                continue;
            }
        };

        let dest_addr = dest_addr.clone();
        tokio::spawn(async move {
            let outbound = match TcpStream::connect(&dest_addr).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(%peer, dest = %dest_addr, "tcp-proxy dial failed: {e}");
                    return;
                }
            };

            let (mut ri, mut wi) = inbound.into_split();
            let (mut ro, mut wo) = outbound.into_split();

            let client_to_server = io::copy(&mut ri, &mut wo);
            let server_to_client = io::copy(&mut ro, &mut wi);

            match tokio::try_join!(client_to_server, server_to_client) {
                Ok((from_client, from_server)) => {
                    debug!(%peer, from_client, from_server, "tcp-proxy connection closed");
                }
                Err(e) => {
                    debug!(%peer, "tcp-proxy relay error: {e}");
                }
            }
        });
    }
}

/// Used by the CLI to validate `-P "localAddr destHost:destPort"` specs
/// before binding a listener.
pub fn parse_tcp_proxy_spec(spec: &str) -> CoreResult<(String, String)> {
    let mut parts = spec.split_whitespace();
    let local_addr = parts
        .next()
        .ok_or_else(|| CoreError::Config("empty -P spec".into()))?
        .to_string();
    let dest_addr = parts
        .next()
        .ok_or_else(|| CoreError::Config(format!("-P spec {spec:?} has no destination")))?
        .to_string();
    Ok((local_addr, dest_addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_tcp_proxy_spec() {
        let (local, dest) = parse_tcp_proxy_spec("127.0.0.1:8080 10.0.0.1:9000").unwrap();
        assert_eq!(local, "127.0.0.1:8080");
        assert_eq!(dest, "10.0.0.1:9000");
    }

    #[test]
    fn rejects_spec_with_no_destination() {
        assert!(parse_tcp_proxy_spec("127.0.0.1:8080").is_err());
    }
}
