//! Request paths and the processing mode bound to each.

use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::handler::ECHO_DATA_PROFILE;

/// What to do with a frame when its profile has no registered handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fallback {
    /// Send nothing back.
    #[default]
    Drop,
    /// Reply with the frame unchanged.
    Echo,
}

impl Fallback {
    /// Reply for a frame nobody handled.
    pub fn apply(self, frame: &[u8]) -> Option<Bytes> {
        match self {
            Fallback::Drop => None,
            Fallback::Echo => Some(Bytes::copy_from_slice(frame)),
        }
    }
}

/// How frames on a route are processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Dump the raw frame, no reply.
    Dump,
    /// Decode the header, report it and dump the payload, no reply.
    HeaderDump,
    /// Reply with the frame unchanged.
    Echo,
    /// Dispatch to the handler registered for `profile`.
    Profile { profile: String, fallback: Fallback },
}

impl Mode {
    /// Whether frames must carry the diagnostic header.
    pub fn requires_header(&self) -> bool {
        matches!(self, Mode::HeaderDump)
    }
}

/// A listening path and its processing mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub mode: Mode,
    /// Dump every frame before it is processed.
    pub log_frames: bool,
}

impl Route {
    pub fn new(path: impl Into<String>, mode: Mode) -> Self {
        Self {
            path: path.into(),
            mode,
            log_frames: false,
        }
    }

    pub fn with_log_frames(mut self, log_frames: bool) -> Self {
        self.log_frames = log_frames;
        self
    }
}

/// Routes served when the configuration names none.
pub fn default_routes() -> Vec<Route> {
    vec![
        Route::new("/dump", Mode::Dump),
        Route::new("/blip", Mode::HeaderDump),
        Route::new("/echo", Mode::Echo),
        Route::new("/ws", Mode::Echo),
        Route::new(
            "/profile",
            Mode::Profile {
                profile: ECHO_DATA_PROFILE.to_string(),
                fallback: Fallback::Drop,
            },
        )
        .with_log_frames(true),
    ]
}

/// Exact-match lookup from request path to route.
///
/// Built once at startup and shared read-only between connections.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<String, Arc<Route>>,
}

impl RouteTable {
    /// Later routes replace earlier ones with the same path.
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        let routes = routes
            .into_iter()
            .map(|route| (route.path.clone(), Arc::new(route)))
            .collect();
        Self { routes }
    }

    pub fn get(&self, path: &str) -> Option<Arc<Route>> {
        self.routes.get(path).cloned()
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }
}
