//! Frame inspection.
//!
//! A frame is one unit of bytes as delivered by a single transport read.
//! Nothing here owns frames; both modules work on borrowed slices:
//!
//! - `dump`: dual hex/ASCII rendering for operators, plus the shared sink
//!   that dumps are written to
//! - `header`: decoding of the 6-byte diagnostic header
//!   (`sequence: u32 BE`, `flags: u16 BE`, payload)

pub mod dump;
pub mod header;

pub use dump::{dump, DumpSink};
pub use header::decode;
