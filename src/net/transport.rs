//! One envelope per TCP connection
//!
//! The sender connects, writes the JSON envelope, and shuts down its write
//! half. The receiver reads until EOF, bounded by the maximum packet size;
//! longer streams are truncated and then fail to parse.

use super::node::NetError;
use super::packet::Packet;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Connect, write, close; the whole exchange is bounded by `timeout`.
pub async fn send_envelope(
    host: &str,
    port: u16,
    packet: &Packet,
    timeout: Duration,
) -> Result<(), NetError> {
    let bytes = packet.encode()?;

    let exchange = async {
        let mut stream = TcpStream::connect((host, port)).await?;
        stream.write_all(&bytes).await?;
        stream.shutdown().await?;
        Ok::<(), std::io::Error>(())
    };

    match tokio::time::timeout(timeout, exchange).await {
        Ok(result) => result.map_err(NetError::from),
        Err(_) => Err(NetError::Timeout),
    }
}

/// Read one envelope body. Without `read_timeout` a peer that never closes
/// its side blocks the caller indefinitely.
pub async fn read_envelope<R: AsyncRead + Unpin>(
    stream: R,
    max_size: usize,
    read_timeout: Option<Duration>,
) -> Result<Vec<u8>, NetError> {
    let mut buf = Vec::new();
    let mut limited = stream.take(max_size as u64);

    match read_timeout {
        Some(limit) => {
            tokio::time::timeout(limit, limited.read_to_end(&mut buf))
                .await
                .map_err(|_| NetError::Timeout)??;
        }
        None => {
            limited.read_to_end(&mut buf).await?;
        }
    }

    Ok(buf)
}
