//! Real-time signal streaming server
//!
//! Tracks connected clients, runs exactly one refresh loop per started session
//! and pushes each aggregation result to its client over WebSocket.

pub mod messages;
pub mod transport;
pub mod session;
pub mod refresh;
pub mod registry;
pub mod server;
pub mod settings;

pub use messages::{ClientCommand, OutboundMessage};
pub use refresh::{LoopExit, RefreshLoop};
pub use registry::{RegistryStats, SessionRegistry, StartOutcome};
pub use server::{StreamServer, WsTransport};
pub use session::SessionTable;
pub use transport::Transport;
