//! Frame handlers and the profile registry.
//!
//! A handler maps an inbound frame to an optional reply. `None` means
//! nothing is written back, which is what the dump-only handlers return.
//!
//! The registry is filled in before the server starts accepting and is
//! read-only afterwards; connections share it through an `Arc`.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::frame::{dump as render_dump, DumpSink};

/// Profile answered by [`profile_echo`] in the default registry.
pub const ECHO_DATA_PROFILE: &str = "BLIPTest/EchoData";

/// Profile answered by [`dump`] in the default registry.
pub const DUMP_PROFILE: &str = "Diagnostics/Dump";

/// A shared frame handler.
pub type Handler = Arc<dyn Fn(&[u8]) -> Option<Bytes> + Send + Sync>;

/// Profile name to handler mapping.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `profile`, replacing and returning any
    /// handler previously registered under the same name.
    pub fn register<F>(&mut self, profile: impl Into<String>, handler: F) -> Option<Handler>
    where
        F: Fn(&[u8]) -> Option<Bytes> + Send + Sync + 'static,
    {
        self.handlers.insert(profile.into(), Arc::new(handler))
    }

    /// Case-sensitive exact lookup.
    pub fn lookup(&self, profile: &str) -> Option<&Handler> {
        self.handlers.get(profile)
    }

    /// Registered profile names, sorted.
    pub fn profiles(&self) -> Vec<&str> {
        let mut profiles: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        profiles.sort_unstable();
        profiles
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("profiles", &self.profiles())
            .finish()
    }
}

/// Registry with the built-in profiles.
pub fn default_registry(sink: &DumpSink) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(ECHO_DATA_PROFILE, profile_echo(sink.clone()));
    registry.register(DUMP_PROFILE, dump(sink.clone()));
    registry
}

/// Log the frame and send it straight back.
pub fn echo(frame: &[u8]) -> Option<Bytes> {
    info!("Read frame: \"{}\"", frame.escape_ascii());
    Some(Bytes::copy_from_slice(frame))
}

/// Dump the frame to `sink` without replying.
pub fn dump_frame(sink: &DumpSink, frame: &[u8]) -> Option<Bytes> {
    sink.write(&render_dump(frame));
    None
}

/// Registrable form of [`dump_frame`].
pub fn dump(sink: DumpSink) -> impl Fn(&[u8]) -> Option<Bytes> + Send + Sync + 'static {
    move |frame: &[u8]| dump_frame(&sink, frame)
}

/// Request/response echo: log and dump the request body, reply with it.
pub fn profile_echo(sink: DumpSink) -> impl Fn(&[u8]) -> Option<Bytes> + Send + Sync + 'static {
    move |frame: &[u8]| {
        info!(len = frame.len(), "Got request");
        sink.write(&render_dump(frame));
        Some(Bytes::copy_from_slice(frame))
    }
}
