//! Diagnostic frame header.
//!
//! ```text
//! bytes 0..4   sequence number, big-endian u32
//! bytes 4..6   flags, big-endian u16 (opaque, displayed only)
//! bytes 6..    payload
//! ```

use bytes::Buf;
use thiserror::Error;

/// Size of the fixed header prefix.
pub const HEADER_LEN: usize = 6;

/// Header fields decoded from the front of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader<'a> {
    pub sequence: u32,
    pub flags: u16,
    /// Everything after the header; empty for a 6-byte frame.
    pub payload: &'a [u8],
}

impl FrameHeader<'_> {
    /// Flags as a zero-padded 16-character binary string.
    pub fn flags_binary(&self) -> String {
        format!("{:016b}", self.flags)
    }

    /// One-line summary of the header, as logged for each decoded frame.
    pub fn report(&self) -> String {
        format!("Frame #{:4}  flags = {}", self.sequence, self.flags_binary())
    }
}

/// Header decoding errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("truncated frame: {len} bytes, header needs {}", HEADER_LEN)]
    TruncatedFrame { len: usize },
}

/// Decode the header at the front of `frame`.
pub fn decode(frame: &[u8]) -> Result<FrameHeader<'_>, HeaderError> {
    if frame.len() < HEADER_LEN {
        return Err(HeaderError::TruncatedFrame { len: frame.len() });
    }

    let mut cursor = frame;
    let sequence = cursor.get_u32();
    let flags = cursor.get_u16();

    Ok(FrameHeader {
        sequence,
        flags,
        payload: cursor,
    })
}
