//! # Shared Wire - Framing for Inter-Service Calls
//!
//! Both ends of a connection speak the same framing:
//!
//! ```text
//! ┌───────────────────────┬──────────────────────────────┐
//! │ length: u32 (BE)      │ body: UTF-8 JSON document    │
//! └───────────────────────┴──────────────────────────────┘
//! ```
//!
//! The client writes a `Request` frame and reads one `Response` frame; the
//! dispatcher does the opposite. Bodies larger than [`MAX_FRAME_LEN`] are
//! rejected by the codec.

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::trace;

pub use shared_types::{Request, Response};

/// Largest accepted frame body (1 MiB).
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// A framed TCP connection.
pub type FramedStream = Framed<TcpStream, LengthDelimitedCodec>;

/// Framing failures.
#[derive(Debug, Error)]
pub enum WireCodecError {
    /// Socket error, including oversized frames.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Body is not the expected JSON document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The codec used on every connection.
pub fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// Wrap an I/O object in the shared framing.
pub fn framed<S>(io: S) -> Framed<S, LengthDelimitedCodec>
where
    S: AsyncRead + AsyncWrite,
{
    Framed::new(io, codec())
}

/// Serialize a message into a frame body.
pub fn encode<T: Serialize>(message: &T) -> Result<Bytes, WireCodecError> {
    Ok(Bytes::from(serde_json::to_vec(message)?))
}

/// Parse a frame body.
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, WireCodecError> {
    Ok(serde_json::from_slice(body)?)
}

/// Encode and write one message.
pub async fn send<S, T>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
    message: &T,
) -> Result<(), WireCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Serialize,
{
    let body = encode(message)?;
    trace!(bytes = body.len(), "Writing frame");
    framed.send(body).await?;
    Ok(())
}

/// Read one raw frame. `Ok(None)` means the peer closed the connection.
pub async fn recv_frame<S>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
) -> Result<Option<BytesMut>, WireCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match framed.next().await {
        Some(Ok(frame)) => {
            trace!(bytes = frame.len(), "Read frame");
            Ok(Some(frame))
        }
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}

/// Read and decode one message. `Ok(None)` means the peer closed the
/// connection.
pub async fn recv<S, T>(
    framed: &mut Framed<S, LengthDelimitedCodec>,
) -> Result<Option<T>, WireCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: DeserializeOwned,
{
    match recv_frame(framed).await? {
        Some(frame) => Ok(Some(decode(&frame)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_types::Tag;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_request_crosses_framing() {
        let (a, b) = tokio::io::duplex(4096);
        let mut client = framed(a);
        let mut server = framed(b);

        send(&mut client, &Request::ping()).await.unwrap();
        let request: Request = recv(&mut server).await.unwrap().unwrap();
        assert_eq!(request.tag, Tag::ping());

        send(&mut server, &Response::ok(json!("pong"))).await.unwrap();
        let response: Response = recv(&mut client).await.unwrap().unwrap();
        assert_eq!(response, Response::ok(json!("pong")));
    }

    #[tokio::test]
    async fn test_length_prefix_is_big_endian_u32() {
        let (a, mut b) = tokio::io::duplex(4096);
        let mut client = framed(a);
        send(&mut client, &json!({"k": 1})).await.unwrap();
        drop(client);

        let mut raw = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut b, &mut raw).await.unwrap();
        let body = br#"{"k":1}"#;
        assert_eq!(&raw[..4], &(body.len() as u32).to_be_bytes());
        assert_eq!(&raw[4..], body);
    }

    #[tokio::test]
    async fn test_closed_peer_yields_none() {
        let (a, b) = tokio::io::duplex(64);
        let mut server = framed(b);
        drop(a);
        let next: Option<Request> = recv(&mut server).await.unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_garbage_body_is_json_error() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut server = framed(b);
        a.write_all(&3u32.to_be_bytes()).await.unwrap();
        a.write_all(b"{{{").await.unwrap();

        let result: Result<Option<Request>, _> = recv(&mut server).await;
        assert!(matches!(result, Err(WireCodecError::Json(_))));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut a, b) = tokio::io::duplex(64);
        let mut server = framed(b);
        a.write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
            .await
            .unwrap();

        let result = recv_frame(&mut server).await;
        assert!(matches!(result, Err(WireCodecError::Io(_))));
    }
}
