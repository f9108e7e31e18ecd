//! UDP echo server: reflects every datagram back to its sender.

use tokio::net::UdpSocket;
use tracing::warn;

use crate::error::{CoreError, CoreResult};

pub async fn serve(bind_addr: &str) -> CoreResult<()> {
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(|e| CoreError::Setup(format!("udp-echo bind {bind_addr}: {e}")))?;

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, peer)) => {
                if let Err(e) = socket.send_to(&buf[..n], peer).await {
                    warn!("udp-echo send_to {peer} failed: {e}");
                }
            }
            Err(e) => {
                warn!("udp-echo recv_from error: {e}");
            }
        }
    }
}
