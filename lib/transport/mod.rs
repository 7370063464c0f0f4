use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const MAX_PAYLOAD: u32 = 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("declared payload length {0} exceeds the {MAX_PAYLOAD} byte limit")]
    PayloadTooLarge(u32),
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("receive timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Reads one length-prefixed frame: a big-endian u32 length, then exactly
/// that many payload bytes. Any zero-byte read before a step completes is
/// treated as an orderly peer close.
pub async fn receive(
    stream: &mut TcpStream,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    let length = tokio::time::timeout(timeout, read_u32(stream))
        .await
        .map_err(|_| TransportError::Timeout)??;

    if length > MAX_PAYLOAD {
        return Err(TransportError::PayloadTooLarge(length));
    }
    if length == 0 {
        return Ok(Vec::new());
    }

    let mut buffer = vec![0u8; length as usize];
    tokio::time::timeout(timeout, stream.read_exact(&mut buffer))
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::ConnectionClosed
            } else {
                TransportError::Io(source)
            }
        })?;

    Ok(buffer)
}

async fn read_u32(stream: &mut TcpStream) -> Result<u32, TransportError> {
    match stream.read_u32().await {
        Ok(value) => Ok(value),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(TransportError::ConnectionClosed)
        }
        Err(err) => Err(TransportError::Io(err)),
    }
}

/// Writes one length-prefixed frame, retrying partial writes until the
/// prefix and payload have fully left (or a socket error occurs).
pub async fn send(stream: &mut TcpStream, payload: &[u8]) -> Result<(), TransportError> {
    stream.write_u32(payload.len() as u32).await?;
    if !payload.is_empty() {
        stream.write_all(payload).await?;
    }
    stream.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tokio::net::TcpListener;

    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let payload = receive(&mut socket, Duration::from_secs(1)).await.unwrap();
            send(&mut socket, &payload).await.unwrap();
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        send(&mut client, b"hello").await.unwrap();
        let echoed = receive(&mut client, Duration::from_secs(1)).await.unwrap();
        assert_eq!(echoed, b"hello");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn oversize_declared_length_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            receive(&mut socket, Duration::from_millis(200)).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_u32(MAX_PAYLOAD + 1).await.unwrap();

        let result = server.await.unwrap();
        assert!(matches!(result, Err(TransportError::PayloadTooLarge(_))));
    }
}
