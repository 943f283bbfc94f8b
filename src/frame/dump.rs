//! Hex/ASCII frame dumps.
//!
//! A dump is two lines. The first renders the frame as lowercase hex in
//! 4-byte groups, the second renders the same groups as printable ASCII:
//!
//! ```text
//!     68656c6c 6f2c2077 6f726c64 210a
//!     h e l l  o ,   w  o r l d  !
//! ```
//!
//! A full group occupies 9 columns on both lines, so the two stay aligned.

use std::io::Write;
#[cfg(test)]
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Bytes per group.
const CHUNK_LEN: usize = 4;

/// Render `frame` as a hex line followed by an ASCII line.
///
/// Bytes outside the printable range `0x20..0x7f` are shown as a space on
/// the ASCII line. An empty frame renders as `"\t\n\t\n"`.
pub fn dump(frame: &[u8]) -> String {
    let groups = frame.len().div_ceil(CHUNK_LEN);
    let mut out = String::with_capacity(4 + frame.len() * 4 + groups * 2);

    out.push('\t');
    for chunk in frame.chunks(CHUNK_LEN) {
        out.push_str(&hex::encode(chunk));
        out.push(' ');
    }
    out.push('\n');

    out.push('\t');
    for chunk in frame.chunks(CHUNK_LEN) {
        for &byte in chunk {
            out.push(printable(byte));
            out.push(' ');
        }
        out.push(' ');
    }
    out.push('\n');

    out
}

fn printable(byte: u8) -> char {
    if (0x20..0x7f).contains(&byte) {
        byte as char
    } else {
        ' '
    }
}

/// Destination for frame dumps, shared by every connection.
///
/// Each call to [`DumpSink::write`] emits the whole dump under one lock, so
/// dumps from concurrent connections never interleave mid-line.
#[derive(Debug, Clone)]
pub struct DumpSink {
    target: Target,
}

#[derive(Debug, Clone)]
enum Target {
    /// Raw text on stdout, tab-aligned as rendered.
    Stdout,
    /// One tracing event per dump.
    Log,
    #[cfg(test)]
    Memory(Arc<Mutex<Vec<u8>>>),
}

impl DumpSink {
    pub fn stdout() -> Self {
        Self {
            target: Target::Stdout,
        }
    }

    pub fn log() -> Self {
        Self {
            target: Target::Log,
        }
    }

    /// Sink that captures dumps in memory, returned alongside the buffer.
    #[cfg(test)]
    pub fn memory() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Self {
            target: Target::Memory(Arc::clone(&buffer)),
        };
        (sink, buffer)
    }

    /// Write one rendered dump.
    ///
    /// Output failures are logged and otherwise ignored; a broken stdout
    /// must not take a connection down.
    pub fn write(&self, text: &str) {
        match &self.target {
            Target::Stdout => {
                let mut out = std::io::stdout().lock();
                if let Err(e) = out.write_all(text.as_bytes()).and_then(|()| out.flush()) {
                    debug!(error = %e, "Failed to write frame dump");
                }
            }
            Target::Log => {
                info!("Frame dump:\n{}", text.trim_end_matches('\n'));
            }
            #[cfg(test)]
            Target::Memory(buffer) => {
                let mut buffer = buffer
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                buffer.extend_from_slice(text.as_bytes());
            }
        }
    }
}
