//! WebSocket server configuration and startup

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use signals_core::{ClientId, ServerConfig, SessionError, TransportError, TransportResult};

use crate::messages::{ClientCommand, OutboundMessage};
use crate::registry::{SessionRegistry, StartOutcome};
use crate::transport::Transport;

/// Transport adapter over WebSocket connections.
///
/// Each connection owns a bounded outbound channel drained by its writer task,
/// which keeps per-client delivery in order.
#[derive(Default)]
pub struct WsTransport {
    clients: DashMap<ClientId, mpsc::Sender<Message>>,
}

impl WsTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, client_id: ClientId, outbound: mpsc::Sender<Message>) {
        self.clients.insert(client_id, outbound);
    }

    fn unregister(&self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }

    pub fn connected_count(&self) -> usize {
        self.clients.len()
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, client_id: &ClientId, message: OutboundMessage) -> TransportResult<()> {
        let payload = message.encode()?;

        // Clone the sender out so no map guard is held across the await
        let outbound = self
            .clients
            .get(client_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TransportError::ClientNotConnected(client_id.clone()))?;

        outbound
            .send(Message::Text(payload))
            .await
            .map_err(|_| TransportError::SendFailed(format!("connection {} closed", client_id)))
    }
}

/// WebSocket server wrapper
pub struct StreamServer {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    transport: Arc<WsTransport>,
}

impl StreamServer {
    /// `registry` must deliver through `transport`
    pub fn new(
        config: ServerConfig,
        registry: Arc<SessionRegistry>,
        transport: Arc<WsTransport>,
    ) -> Self {
        Self {
            config,
            registry,
            transport,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Get server address
    pub fn address(&self) -> String {
        self.config.address()
    }

    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        let listener = TcpListener::bind(self.address()).await?;
        info!("WebSocket server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Start with graceful shutdown
    pub async fn start_with_shutdown(&self, shutdown: oneshot::Receiver<()>) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Accept connections until `shutdown` fires, then tear down every session
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: oneshot::Receiver<()>,
    ) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("New connection from {}", peer);
                        let registry = Arc::clone(&self.registry);
                        let transport = Arc::clone(&self.transport);
                        let buffer = self.config.outbound_buffer;

                        tokio::spawn(async move {
                            if let Err(e) =
                                handle_connection(stream, peer, registry, transport, buffer).await
                            {
                                warn!("Connection error from {}: {}", peer, e);
                            }
                        });
                    }
                    Err(e) => error!("Accept failed: {}", e),
                },
            }
        }

        self.registry.shutdown().await;
        Ok(())
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<SessionRegistry>,
    transport: Arc<WsTransport>,
    buffer: usize,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let client_id = ClientId::generate();
    info!(client = %client_id, %peer, "WebSocket connection established");

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(buffer);
    transport.register(client_id.clone(), outbound_tx.clone());

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if let Err(e) = write.send(message).await {
                debug!("Write failed: {}", e);
                break;
            }
        }
        let _ = write.close().await;
    });

    let accepted = match registry.on_connect(&client_id).await {
        Ok(()) => true,
        Err(SessionError::ShuttingDown) => {
            info!(client = %client_id, "Closing connection accepted during shutdown");
            false
        }
        Err(e) => {
            warn!(client = %client_id, "Failed to send start notification: {}", e);
            true
        }
    };

    if accepted {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match ClientCommand::parse(&text) {
                    Some(ClientCommand::Start) => match registry.on_start(&client_id) {
                        Ok(StartOutcome::Started) => {}
                        Ok(StartOutcome::AlreadyRunning) => {
                            debug!(client = %client_id, "Client already streaming")
                        }
                        Err(e) => warn!(client = %client_id, "Start rejected: {}", e),
                    },
                    Some(ClientCommand::Stop) => {
                        registry.on_stop(&client_id).await;
                    }
                    None => debug!(client = %client_id, "Ignoring unrecognized frame: {}", text),
                },
                Ok(Message::Ping(data)) => {
                    let _ = outbound_tx.send(Message::Pong(data)).await;
                }
                Ok(Message::Close(_)) => {
                    debug!(client = %client_id, "WebSocket closed by client");
                    break;
                }
                Err(e) => {
                    warn!(client = %client_id, "WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    }

    registry.on_disconnect(&client_id).await;
    transport.unregister(&client_id);
    drop(outbound_tx);

    // Every sender is gone once the loop is joined and the client unregistered
    if let Err(e) = writer.await {
        warn!(client = %client_id, "Writer task failed: {}", e);
    }

    Ok(())
}
