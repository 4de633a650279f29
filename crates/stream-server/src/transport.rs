//! Outbound delivery seam

use async_trait::async_trait;

use signals_core::{ClientId, TransportResult};

use crate::messages::OutboundMessage;

/// Delivers messages to connected clients.
///
/// Messages sent to one client must arrive in the order `send` was called.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, client_id: &ClientId, message: OutboundMessage) -> TransportResult<()>;
}
