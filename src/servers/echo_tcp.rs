//! TCP echo server: accepts connections and reflects every byte it reads
//! back to the sender, matching the TCP adapter's byte-exact-echo contract.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

pub async fn serve(bind_addr: &str) -> CoreResult<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| CoreError::Setup(format!("tcp-echo bind {bind_addr}: {e}")))?;

    loop {
        let (mut socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("tcp-echo accept error: {e}");
                continue;
            }
        };

        tokio::spawn(async move {
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break, // peer closed
                    Ok(n) => {
                        if socket.write_all(&buf[..n]).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(%peer, "tcp-echo read error: {e}");
                        break;
                    }
                }
            }
        });
    }
}
