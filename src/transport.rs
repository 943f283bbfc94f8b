//! Frame transport.
//!
//! The connection loop only needs two primitives: read one frame into a
//! caller-owned buffer, and write one frame. [`WsTransport`] provides them
//! over an upgraded WebSocket stream.
//!
//! A WebSocket message larger than the read buffer is handed out over
//! successive reads, each of which the loop treats as a frame of its own.

use bytes::{Buf, Bytes};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;

use crate::connection::ConnectionError;

/// Read-frame/write-frame primitive over one connection.
pub trait FrameTransport {
    /// Read the next frame into `buf`, returning the number of bytes
    /// written. `Ok(0)` is an empty frame, not end of stream.
    fn read_frame(
        &mut self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<usize, ConnectionError>> + Send;

    /// Send `frame` as one message.
    fn write_frame(
        &mut self,
        frame: &[u8],
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send;
}

/// [`FrameTransport`] over a WebSocket stream.
pub struct WsTransport<S> {
    stream: WebSocketStream<S>,
    /// Unread remainder of the current message.
    pending: Bytes,
    /// Whether the current message arrived as text.
    text: bool,
}

impl<S> WsTransport<S> {
    pub fn new(stream: WebSocketStream<S>) -> Self {
        Self {
            stream,
            pending: Bytes::new(),
            text: false,
        }
    }
}

impl<S> FrameTransport for WsTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        if self.pending.is_empty() {
            loop {
                let message = match self.stream.next().await {
                    Some(Ok(message)) => message,
                    Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                        return Err(ConnectionError::StreamClosed)
                    }
                    Some(Err(e)) => return Err(ConnectionError::ReadFailure(into_io(e))),
                };

                match message {
                    Message::Binary(data) => {
                        self.pending = Bytes::from(data);
                        self.text = false;
                    }
                    Message::Text(text) => {
                        self.pending = Bytes::from(text);
                        self.text = true;
                    }
                    Message::Close(_) => return Err(ConnectionError::StreamClosed),
                    // Pings are answered by tungstenite itself.
                    _ => continue,
                }
                break;
            }
        }

        let n = self.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ConnectionError> {
        let message = match std::str::from_utf8(frame) {
            Ok(text) if self.text => Message::Text(text.to_owned()),
            _ => Message::Binary(frame.to_vec()),
        };

        self.stream
            .send(message)
            .await
            .map_err(|e| ConnectionError::WriteFailure(into_io(e)))
    }
}

fn into_io(err: WsError) -> io::Error {
    match err {
        WsError::Io(e) => e,
        other => io::Error::other(other),
    }
}
