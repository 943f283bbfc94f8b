//! WebSocket listener.
//!
//! Accepts TCP connections, upgrades them to WebSocket, matches the request
//! path against the route table and runs one [`Session`] per connection.
//! Nothing that happens on a connection reaches the accept loop; only a
//! bind failure ends the server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{AcquireError, Semaphore};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, info_span, Instrument};

use crate::config::Config;
use crate::connection::Session;
use crate::frame::DumpSink;
use crate::handler::HandlerRegistry;
use crate::route::{Route, RouteTable};
use crate::transport::WsTransport;

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not
/// spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    BindFailure {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection limiter closed")]
    LimiterClosed(#[from] AcquireError),
}

/// Server instance
pub struct Server {
    listen: String,
    buffer_size: usize,
    routes: Arc<RouteTable>,
    registry: Arc<HandlerRegistry>,
    sink: DumpSink,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a server. `registry` must be complete; it is frozen here.
    pub fn new(config: Config, registry: HandlerRegistry, sink: DumpSink) -> Self {
        Server {
            listen: config.listen,
            buffer_size: config.buffer_size,
            routes: Arc::new(RouteTable::new(config.routes)),
            registry: Arc::new(registry),
            sink,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        }
    }

    /// Bind and serve until the process is stopped.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Bind the configured listen address.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(&self.listen)
            .await
            .map_err(|source| ServerError::BindFailure {
                addr: self.listen.clone(),
                source,
            })
    }

    /// Accept connections on `listener` forever.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(addr) => info!(address = %addr, routes = ?self.routes.paths(), "Server listening"),
            Err(e) => debug!(error = %e, "Listener has no local address"),
        }

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    let routes = Arc::clone(&self.routes);
                    let registry = Arc::clone(&self.registry);
                    let sink = self.sink.clone();
                    let buffer_size = self.buffer_size;

                    tokio::spawn(async move {
                        handle_connection(stream, peer, routes, registry, sink, buffer_size)
                            .await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    drop(permit);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Upgrade one connection and run its frame loop.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    routes: Arc<RouteTable>,
    registry: Arc<HandlerRegistry>,
    sink: DumpSink,
    buffer_size: usize,
) {
    let mut matched: Option<Arc<Route>> = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let path = request.uri().path();
        match routes.get(path) {
            Some(route) => {
                matched = Some(route);
                Ok(response)
            }
            None => Err(not_found(path)),
        }
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(peer = %peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    let Some(route) = matched else {
        return;
    };

    let span = info_span!("conn", peer = %peer, path = %route.path);
    async move {
        info!("--- Received connection");
        Session::new(WsTransport::new(ws), buffer_size, route, registry, sink)
            .run()
            .await;
    }
    .instrument(span)
    .await;
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("no route for {path}")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DumpOutput;
    use crate::handler::default_registry;
    use crate::route::default_routes;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};

    fn test_config(listen: &str) -> Config {
        Config {
            listen: listen.to_string(),
            workers: None,
            max_connections: 16,
            buffer_size: 8000,
            dump_output: DumpOutput::Stdout,
            log_level: "info".to_string(),
            routes: default_routes(),
        }
    }

    /// Serve the default routes on an ephemeral port.
    async fn start() -> SocketAddr {
        let (sink, _) = DumpSink::memory();
        let server = Server::new(test_config("127.0.0.1:0"), default_registry(&sink), sink);
        let listener = tokio_test::assert_ok!(server.bind().await);
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener).await });
        addr
    }

    async fn next_data(
        ws: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<TcpStream>,
        >,
    ) -> Message {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Ping(_) | Message::Pong(_) => continue,
                message => return message,
            }
        }
    }

    #[tokio::test]
    async fn test_echo_over_websocket() {
        let addr = start().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/echo")).await.unwrap();

        ws.send(Message::Text("hello, world!\n".to_string()))
            .await
            .unwrap();
        assert_eq!(
            next_data(&mut ws).await,
            Message::Text("hello, world!\n".to_string())
        );

        ws.send(Message::Binary(vec![0, 1, 2, 0xff])).await.unwrap();
        assert_eq!(
            next_data(&mut ws).await,
            Message::Binary(vec![0, 1, 2, 0xff])
        );
    }

    #[tokio::test]
    async fn test_profile_route_echoes_through_registry() {
        let addr = start().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/profile")).await.unwrap();

        ws.send(Message::Binary(b"body".to_vec())).await.unwrap();
        assert_eq!(next_data(&mut ws).await, Message::Binary(b"body".to_vec()));
    }

    #[tokio::test]
    async fn test_unknown_path_rejected() {
        let addr = start().await;
        match connect_async(format!("ws://{addr}/nope")).await {
            Err(WsError::Http(response)) => {
                assert_eq!(response.status(), StatusCode::NOT_FOUND);
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("upgrade to unknown path succeeded"),
        }
    }

    #[tokio::test]
    async fn test_closed_connection_does_not_stop_server() {
        let addr = start().await;

        let (mut first, _) = connect_async(format!("ws://{addr}/echo")).await.unwrap();
        let (mut second, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
        first.close(None).await.unwrap();
        drop(first);

        second.send(Message::Text("still here".to_string())).await.unwrap();
        assert_eq!(
            next_data(&mut second).await,
            Message::Text("still here".to_string())
        );

        let (mut third, _) = connect_async(format!("ws://{addr}/echo")).await.unwrap();
        third.send(Message::Text("again".to_string())).await.unwrap();
        assert_eq!(next_data(&mut third).await, Message::Text("again".to_string()));
    }

    #[tokio::test]
    async fn test_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let (sink, _) = DumpSink::memory();
        let server = Server::new(test_config(&addr), HandlerRegistry::new(), sink);
        match server.bind().await {
            Err(ServerError::BindFailure { addr: failed, .. }) => assert_eq!(failed, addr),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
