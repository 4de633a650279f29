//! Per-session refresh loop

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use signals_core::{ClientId, FetchResult, SessionError, Snapshot};
use signals_data_feed::SnapshotProvider;

use crate::messages::OutboundMessage;
use crate::session::{Liveness, SessionTable};
use crate::transport::Transport;

/// Why a refresh loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Shutdown signal from stop, disconnect or server shutdown
    Cancelled,
    /// Session no longer registered as running
    SessionGone,
    /// Another loop owns the session; this one yields
    Superseded,
}

/// Repeatedly aggregates and delivers to one client until cancelled
pub struct RefreshLoop {
    client_id: ClientId,
    generation: u64,
    sessions: Arc<SessionTable>,
    provider: Arc<dyn SnapshotProvider>,
    transport: Arc<dyn Transport>,
    interval: Duration,
}

impl RefreshLoop {
    pub(crate) fn new(
        client_id: ClientId,
        generation: u64,
        sessions: Arc<SessionTable>,
        provider: Arc<dyn SnapshotProvider>,
        transport: Arc<dyn Transport>,
        interval: Duration,
    ) -> Self {
        Self {
            client_id,
            generation,
            sessions,
            provider,
            transport,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) -> LoopExit {
        info!(client = %self.client_id, generation = self.generation, "Refresh loop started");

        let exit = self.run_cycles(&mut shutdown).await;

        info!(client = %self.client_id, generation = self.generation, ?exit, "Refresh loop stopped");
        exit
    }

    async fn run_cycles(&self, shutdown: &mut oneshot::Receiver<()>) -> LoopExit {
        let mut cycle: u64 = 0;

        loop {
            if let Some(exit) = self.check_liveness(shutdown) {
                return exit;
            }

            // The aggregator call, delivery and sleep all yield to the shutdown signal
            let outcome = tokio::select! {
                biased;
                _ = &mut *shutdown => return LoopExit::Cancelled,
                outcome = self.provider.snapshot() => outcome,
            };

            let message = self.to_message(cycle, outcome);

            tokio::select! {
                biased;
                _ = &mut *shutdown => return LoopExit::Cancelled,
                result = self.transport.send(&self.client_id, message) => {
                    if let Err(e) = result {
                        warn!(client = %self.client_id, cycle, "Failed to deliver update: {}", e);
                    }
                }
            }

            cycle += 1;

            tokio::select! {
                biased;
                _ = &mut *shutdown => return LoopExit::Cancelled,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    fn check_liveness(&self, shutdown: &mut oneshot::Receiver<()>) -> Option<LoopExit> {
        match shutdown.try_recv() {
            Ok(()) | Err(TryRecvError::Closed) => return Some(LoopExit::Cancelled),
            Err(TryRecvError::Empty) => {}
        }

        match self.sessions.liveness(&self.client_id, self.generation) {
            Liveness::Current => None,
            Liveness::Gone => Some(LoopExit::SessionGone),
            Liveness::Superseded { current } => {
                let violation = SessionError::InvariantViolation(format!(
                    "refresh loop {} for client {} runs alongside loop {}",
                    self.generation, self.client_id, current
                ));
                error!(client = %self.client_id, "Duplicate refresh loop detected: {}", violation);
                if cfg!(debug_assertions) {
                    panic!("{}", violation);
                }
                Some(LoopExit::Superseded)
            }
        }
    }

    fn to_message(&self, cycle: u64, outcome: FetchResult<Snapshot>) -> OutboundMessage {
        match outcome {
            Ok(snapshot) => {
                debug!(
                    client = %self.client_id,
                    cycle,
                    price = snapshot.price,
                    signal = %snapshot.signal,
                    "Sending update"
                );
                OutboundMessage::update(snapshot)
            }
            Err(failure) => {
                warn!(
                    client = %self.client_id,
                    cycle,
                    stage = %failure.stage(),
                    "Cycle failed, sending error update: {}",
                    failure
                );
                OutboundMessage::UpdateError(failure.to_string())
            }
        }
    }
}
