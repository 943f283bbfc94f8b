//! Per-connection frame loop.
//!
//! ```text
//! AWAITING_FRAME --read n > 0--> PROCESSING --reply written / none--> AWAITING_FRAME
//!       |   ^                        |
//!       |   +------ read 0 ----------+ (no-op)
//!       +--read error / closed--> TERMINATED <--write error--+
//! ```
//!
//! One transport read is one frame; nothing is reassembled. Frames are
//! processed and answered strictly in arrival order.

use bytes::Bytes;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::{self, DumpSink};
use crate::handler::{self, HandlerRegistry};
use crate::route::{Mode, Route};
use crate::transport::FrameTransport;

/// Default scratch buffer size. Larger messages are split across reads.
pub const DEFAULT_BUFFER_SIZE: usize = 8000;

/// Why a connection loop ended.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The peer closed the stream. This is the normal way a session ends.
    #[error("stream closed")]
    StreamClosed,
    #[error("read failed: {0}")]
    ReadFailure(#[source] io::Error),
    #[error("write failed: {0}")]
    WriteFailure(#[source] io::Error),
}

/// One accepted connection and its scratch buffer.
pub struct Session<T> {
    transport: T,
    buffer: Box<[u8]>,
    route: Arc<Route>,
    registry: Arc<HandlerRegistry>,
    sink: DumpSink,
    frames_in: u64,
    replies_out: u64,
}

impl<T: FrameTransport> Session<T> {
    pub fn new(
        transport: T,
        buffer_size: usize,
        route: Arc<Route>,
        registry: Arc<HandlerRegistry>,
        sink: DumpSink,
    ) -> Self {
        Self {
            transport,
            buffer: vec![0u8; buffer_size].into_boxed_slice(),
            route,
            registry,
            sink,
            frames_in: 0,
            replies_out: 0,
        }
    }

    /// Run until the transport fails or closes, returning the cause.
    pub async fn run(mut self) -> ConnectionError {
        let cause = loop {
            let n = match self.transport.read_frame(&mut self.buffer).await {
                Ok(0) => continue,
                Ok(n) => n,
                Err(e) => break e,
            };
            self.frames_in += 1;

            let Some(reply) = self.process(&self.buffer[..n]) else {
                continue;
            };
            if let Err(e) = self.transport.write_frame(&reply).await {
                break e;
            }
            self.replies_out += 1;
        };

        match &cause {
            ConnectionError::StreamClosed => info!(
                frames = self.frames_in,
                replies = self.replies_out,
                "--- End connection (stream closed)"
            ),
            e => warn!(
                frames = self.frames_in,
                replies = self.replies_out,
                error = %e,
                "--- End connection"
            ),
        }
        cause
    }

    /// Dump, decode and dispatch one frame.
    fn process(&self, frame: &[u8]) -> Option<Bytes> {
        if self.route.log_frames {
            self.sink.write(&frame::dump(frame));
        }

        if self.route.mode.requires_header() {
            match frame::decode(frame) {
                Ok(header) => {
                    info!("{}", header.report());
                    self.sink.write(&frame::dump(header.payload));
                }
                Err(e) => {
                    warn!(error = %e, "Undecodable frame, dispatch skipped");
                    if !self.route.log_frames {
                        self.sink.write(&frame::dump(frame));
                    }
                    return None;
                }
            }
        }

        match &self.route.mode {
            Mode::Dump => handler::dump_frame(&self.sink, frame),
            Mode::HeaderDump => None,
            Mode::Echo => handler::echo(frame),
            Mode::Profile { profile, fallback } => match self.registry.lookup(profile) {
                Some(handler) => handler(frame),
                None => {
                    debug!(profile = %profile, ?fallback, "No handler for profile");
                    fallback.apply(frame)
                }
            },
        }
    }
}
