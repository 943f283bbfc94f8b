//! frame-echo: a diagnostic echo harness for framed WebSocket traffic
//!
//! Each listening path is bound to a processing mode:
//! - `dump`: print every frame as a hex/ASCII dump
//! - `header_dump`: decode the 6-byte sequence/flags header, dump the payload
//! - `echo`: send every frame straight back
//! - `profile`: dispatch to a named handler from the registry
//!
//! Features:
//! - One task per connection; a failing peer only ends its own session
//! - Dumps serialized per frame so concurrent connections stay readable
//! - Configuration via CLI arguments or TOML file

mod config;
mod connection;
mod frame;
mod handler;
mod route;
mod server;
mod transport;

use config::{Config, DumpOutput};
use frame::DumpSink;
use server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let sink = match config.dump_output {
        DumpOutput::Stdout => DumpSink::stdout(),
        DumpOutput::Log => DumpSink::log(),
    };

    // Handlers are fixed from here on
    let registry = handler::default_registry(&sink);

    info!(
        listen = %config.listen,
        workers = ?config.workers,
        max_connections = config.max_connections,
        buffer_size = config.buffer_size,
        dump_output = ?config.dump_output,
        profiles = ?registry.profiles(),
        "Starting frame-echo server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    let server = Server::new(config, registry, sink);
    if let Err(e) = runtime.block_on(server.run()) {
        error!(error = %e, "Server stopped");
        return Err(e.into());
    }
    Ok(())
}
