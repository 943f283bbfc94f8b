//! Probe client for frame-echo.
//!
//! Connects to a route, sends one frame, waits for one reply and prints it.
//! Exits non-zero if the connection, the send or the reply fails.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the probe client
#[derive(Parser, Debug)]
#[command(name = "frame-echo-client")]
#[command(version = "0.1.0")]
#[command(about = "Send one frame to a frame-echo route and print the reply", long_about = None)]
struct Args {
    /// WebSocket URL of the route
    #[arg(short, long, default_value = "ws://127.0.0.1:12345/ws")]
    url: String,

    /// Frame contents
    #[arg(short, long, default_value = "hello, world!\n")]
    message: String,

    /// Send as a binary frame instead of text
    #[arg(long)]
    binary: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let (mut ws, response) = connect_async(args.url.as_str()).await?;
    debug!(status = %response.status(), url = %args.url, "Connected");

    let frame = if args.binary {
        Message::Binary(args.message.into_bytes())
    } else {
        Message::Text(args.message)
    };
    ws.send(frame).await?;

    let reply = loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => break text.into_bytes(),
            Some(Ok(Message::Binary(data))) => break data,
            Some(Ok(Message::Close(_))) | None => {
                return Err("connection closed before a reply arrived".into())
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    };

    println!("Received: {}.", String::from_utf8_lossy(&reply));
    ws.close(None).await?;
    Ok(())
}
