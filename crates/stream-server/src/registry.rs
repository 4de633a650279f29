//! Session registry - lifecycle of client sessions and their refresh loops

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use signals_core::{ClientId, SessionError, SessionResult};
use signals_data_feed::SnapshotProvider;

use crate::messages::OutboundMessage;
use crate::refresh::{LoopExit, RefreshLoop};
use crate::session::{LoopHandle, SessionTable};
use crate::transport::Transport;

pub use crate::session::StartOutcome;

/// Owns every session; at most one refresh loop runs per session
pub struct SessionRegistry {
    sessions: Arc<SessionTable>,
    transport: Arc<dyn Transport>,
    provider: Arc<dyn SnapshotProvider>,
    interval: Duration,
    closed: AtomicBool,
}

impl SessionRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        provider: Arc<dyn SnapshotProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionTable::new()),
            transport,
            provider,
            interval,
            closed: AtomicBool::new(false),
        }
    }

    /// Register the client and tell it to send `start`. Repeated calls are no-ops.
    ///
    /// Fails with `ShuttingDown` once `shutdown` has begun.
    pub async fn on_connect(&self, client_id: &ClientId) -> SessionResult<()> {
        if !self.sessions.register(client_id) {
            debug!(client = %client_id, "Client already registered");
            return Ok(());
        }

        // Checked after registering: either shutdown's drain sees this entry or we undo it here
        if self.is_closed() {
            self.sessions.remove(client_id);
            debug!(client = %client_id, "Connect refused during shutdown");
            return Err(SessionError::ShuttingDown);
        }

        info!(client = %client_id, "Client connected");
        self.transport.send(client_id, OutboundMessage::Start).await?;
        Ok(())
    }

    /// Launch the client's refresh loop unless one is already running.
    ///
    /// Clients that never connected, or already disconnected, get `UnknownClient`.
    pub fn on_start(&self, client_id: &ClientId) -> SessionResult<StartOutcome> {
        if self.is_closed() {
            return Err(SessionError::ShuttingDown);
        }

        let outcome = self.sessions.start_with(client_id, |generation| {
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let refresh = RefreshLoop::new(
                client_id.clone(),
                generation,
                Arc::clone(&self.sessions),
                Arc::clone(&self.provider),
                Arc::clone(&self.transport),
                self.interval,
            );
            let task = tokio::spawn(refresh.run(shutdown_rx));
            LoopHandle::new(generation, shutdown_tx, task)
        })?;

        match outcome {
            StartOutcome::Started => info!(client = %client_id, "Session started"),
            StartOutcome::AlreadyRunning => {
                debug!(client = %client_id, "Duplicate start ignored")
            }
        }
        Ok(outcome)
    }

    /// Stop streaming but keep the client registered. Returns whether a loop was running.
    pub async fn on_stop(&self, client_id: &ClientId) -> bool {
        match self.sessions.deactivate(client_id) {
            Some(task) => {
                info!(client = %client_id, "Session stopped");
                join_loop(client_id, task).await;
                true
            }
            None => false,
        }
    }

    /// Forget the client, stopping and joining its loop. Returns whether it was known.
    pub async fn on_disconnect(&self, client_id: &ClientId) -> bool {
        match self.sessions.remove(client_id) {
            Some(task) => {
                info!(client = %client_id, "Client disconnected");
                if let Some(task) = task {
                    join_loop(client_id, task).await;
                }
                true
            }
            None => false,
        }
    }

    /// Drop every session and wait for every loop to finish
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let tasks = self.sessions.drain();
        info!("Stopping {} refresh loops", tasks.len());

        join_all(
            tasks
                .into_iter()
                .map(|(client_id, task)| async move { join_loop(&client_id, task).await }),
        )
        .await;

        info!("Session registry shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_known(&self, client_id: &ClientId) -> bool {
        self.sessions.is_known(client_id)
    }

    pub fn is_active(&self, client_id: &ClientId) -> bool {
        self.sessions.is_active(client_id)
    }

    /// Get statistics
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            known_sessions: self.sessions.known_count(),
            active_sessions: self.sessions.active_count(),
        }
    }
}

async fn join_loop(client_id: &ClientId, task: JoinHandle<LoopExit>) {
    match task.await {
        Ok(exit) => debug!(client = %client_id, ?exit, "Refresh loop joined"),
        Err(e) if e.is_panic() => error!(client = %client_id, "Refresh loop panicked: {}", e),
        Err(e) => warn!(client = %client_id, "Refresh loop aborted: {}", e),
    }
}

/// Registry statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub known_sessions: usize,
    pub active_sessions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use signals_core::{FetchFailure, FetchResult, Signal, Snapshot, TransportError, TransportResult};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    const INTERVAL: Duration = Duration::from_secs(10);

    fn snapshot(price: f64) -> Snapshot {
        Snapshot {
            price,
            price_change_24h: 0.0,
            active_addresses: 1,
            tx_volume: 1.0,
            rsi: Some(50.0),
            signal: Signal::Hold,
            block_height: 1,
            fastest_fee: 1,
            historical_series: vec![],
        }
    }

    /// Provider replaying a script of outcomes, then succeeding forever
    #[derive(Default)]
    struct ScriptedProvider {
        script: Mutex<VecDeque<FetchResult<Snapshot>>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn with_script(script: Vec<FetchResult<Snapshot>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotProvider for ScriptedProvider {
        async fn snapshot(&self) -> FetchResult<Snapshot> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(snapshot(call as f64)))
        }
    }

    /// Provider that never completes, standing in for a hung upstream
    struct StalledProvider;

    #[async_trait]
    impl SnapshotProvider for StalledProvider {
        async fn snapshot(&self) -> FetchResult<Snapshot> {
            std::future::pending().await
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ClientId, OutboundMessage)>>,
        /// Number of upcoming update sends to reject
        failing_updates: AtomicUsize,
    }

    impl RecordingTransport {
        fn failing_first_updates(count: usize) -> Self {
            Self {
                failing_updates: AtomicUsize::new(count),
                ..Default::default()
            }
        }

        fn messages_for(&self, client_id: &ClientId) -> Vec<OutboundMessage> {
            self.sent
                .lock()
                .iter()
                .filter(|(id, _)| id == client_id)
                .map(|(_, m)| m.clone())
                .collect()
        }

        fn updates_for(&self, client_id: &ClientId) -> Vec<OutboundMessage> {
            self.messages_for(client_id)
                .into_iter()
                .filter(|m| m.kind() == "update")
                .collect()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, client_id: &ClientId, message: OutboundMessage) -> TransportResult<()> {
            let rejected = message.kind() == "update"
                && self
                    .failing_updates
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if rejected {
                return Err(TransportError::SendFailed("connection reset".into()));
            }

            self.sent.lock().push((client_id.clone(), message));
            Ok(())
        }
    }

    fn registry_with(
        provider: Arc<dyn SnapshotProvider>,
    ) -> (SessionRegistry, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let registry = SessionRegistry::new(transport.clone(), provider, INTERVAL);
        (registry, transport)
    }

    /// Let spawned loops run up to their next await point
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sends_start_once() {
        let (registry, transport) = registry_with(Arc::new(ScriptedProvider::default()));
        let id = ClientId::from("client-1");

        registry.on_connect(&id).await.unwrap();
        registry.on_connect(&id).await.unwrap();

        assert_eq!(transport.messages_for(&id), vec![OutboundMessage::Start]);
        assert!(registry.is_known(&id));
        assert!(!registry.is_active(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_runs_one_loop() {
        let provider = Arc::new(ScriptedProvider::default());
        let (registry, transport) = registry_with(provider.clone());
        let id = ClientId::from("client-1");
        registry.on_connect(&id).await.unwrap();

        assert_eq!(registry.on_start(&id).unwrap(), StartOutcome::Started);
        assert_eq!(registry.on_start(&id).unwrap(), StartOutcome::AlreadyRunning);
        settle().await;

        tokio::time::sleep(INTERVAL * 3 + Duration::from_secs(1)).await;

        // One loop: cycles at t = 0, 10, 20, 30
        assert_eq!(provider.calls(), 4);
        assert_eq!(transport.updates_for(&id).len(), 4);
        assert_eq!(registry.stats().active_sessions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_starts_for_one_client() {
        let provider = Arc::new(ScriptedProvider::default());
        let (registry, _transport) = registry_with(provider.clone());
        let registry = Arc::new(registry);
        let id = ClientId::from("client-1");
        registry.on_connect(&id).await.unwrap();

        let attempts = (0..16).map(|_| {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move { registry.on_start(&id).unwrap() })
        });
        let outcomes: Vec<StartOutcome> = join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let started = outcomes.iter().filter(|o| **o == StartOutcome::Started).count();
        assert_eq!(started, 1);

        settle().await;
        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_before_connect_is_rejected() {
        let (registry, transport) = registry_with(Arc::new(ScriptedProvider::default()));
        let id = ClientId::from("client-1");

        assert!(matches!(registry.on_start(&id), Err(SessionError::UnknownClient(_))));
        settle().await;
        assert!(transport.messages_for(&id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_before_start_prevents_loop() {
        let provider = Arc::new(ScriptedProvider::default());
        let (registry, transport) = registry_with(provider.clone());
        let id = ClientId::from("client-1");

        registry.on_connect(&id).await.unwrap();
        assert!(registry.on_disconnect(&id).await);
        assert!(registry.on_start(&id).is_err());

        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(provider.calls(), 0);
        assert!(transport.updates_for(&id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_stops_sends() {
        let provider = Arc::new(ScriptedProvider::default());
        let (registry, transport) = registry_with(provider.clone());
        let id = ClientId::from("client-1");

        registry.on_connect(&id).await.unwrap();
        registry.on_start(&id).unwrap();
        settle().await;
        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(transport.updates_for(&id).len(), 1);

        assert!(registry.on_disconnect(&id).await);
        assert!(!registry.on_disconnect(&id).await);
        assert_eq!(registry.stats().known_sessions, 0);

        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(transport.updates_for(&id).len(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_interrupts_inflight_aggregation() {
        let (registry, transport) = registry_with(Arc::new(StalledProvider));
        let id = ClientId::from("client-1");

        registry.on_connect(&id).await.unwrap();
        registry.on_start(&id).unwrap();
        settle().await;

        // Joins the loop even though its aggregator call never returns
        assert!(registry.on_disconnect(&id).await);
        assert!(transport.updates_for(&id).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_then_recovery() {
        let provider = Arc::new(ScriptedProvider::with_script(vec![
            Ok(snapshot(1.0)),
            Err(FetchFailure::Price("HTTP 503".into())),
        ]));
        let (registry, transport) = registry_with(provider.clone());
        let id = ClientId::from("client-1");

        registry.on_connect(&id).await.unwrap();
        registry.on_start(&id).unwrap();
        settle().await;
        tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(1)).await;

        let updates = transport.updates_for(&id);
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0], OutboundMessage::update(snapshot(1.0)));
        assert_eq!(
            updates[1],
            OutboundMessage::UpdateError("price fetch failed: HTTP 503".into())
        );
        assert!(matches!(&updates[2], OutboundMessage::Update(s) if s.price == 2.0));
        assert!(registry.is_active(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_then_restart() {
        let provider = Arc::new(ScriptedProvider::default());
        let (registry, transport) = registry_with(provider.clone());
        let id = ClientId::from("client-1");

        registry.on_connect(&id).await.unwrap();
        registry.on_start(&id).unwrap();
        settle().await;

        assert!(registry.on_stop(&id).await);
        assert!(!registry.on_stop(&id).await);
        assert!(registry.is_known(&id));
        assert!(!registry.is_active(&id));

        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(transport.updates_for(&id).len(), 1);

        assert_eq!(registry.on_start(&id).unwrap(), StartOutcome::Started);
        settle().await;
        tokio::time::sleep(INTERVAL / 2).await;
        assert_eq!(transport.updates_for(&id).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_start_disconnect_end_to_end() {
        let (registry, transport) = registry_with(Arc::new(ScriptedProvider::default()));
        let id = ClientId::from("client-1");
        let other = ClientId::from("client-2");

        registry.on_connect(&id).await.unwrap();
        registry.on_connect(&other).await.unwrap();
        registry.on_start(&id).unwrap();
        registry.on_start(&other).unwrap();
        settle().await;

        tokio::time::sleep(INTERVAL - Duration::from_millis(1)).await;
        assert_eq!(transport.updates_for(&id).len(), 1);

        registry.on_disconnect(&id).await;
        tokio::time::sleep(INTERVAL * 2).await;

        assert_eq!(transport.updates_for(&id).len(), 1);
        // The other client keeps streaming
        assert_eq!(transport.updates_for(&other).len(), 3);
        assert_eq!(
            registry.stats(),
            RegistryStats { known_sessions: 1, active_sessions: 1 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_joins_every_loop() {
        let provider = Arc::new(ScriptedProvider::default());
        let (registry, transport) = registry_with(provider.clone());

        let ids: Vec<ClientId> = (0..5).map(|i| ClientId::new(format!("client-{i}"))).collect();
        for id in &ids {
            registry.on_connect(id).await.unwrap();
            registry.on_start(id).unwrap();
        }
        settle().await;
        assert_eq!(registry.stats().active_sessions, 5);

        registry.shutdown().await;
        assert_eq!(registry.stats().known_sessions, 0);

        let sent = transport.sent.lock().len();
        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(transport.sent.lock().len(), sent);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_keeps_streaming() {
        let provider = Arc::new(ScriptedProvider::default());
        let transport = Arc::new(RecordingTransport::failing_first_updates(1));
        let registry = SessionRegistry::new(transport.clone(), provider.clone(), INTERVAL);
        let id = ClientId::from("client-1");

        registry.on_connect(&id).await.unwrap();
        registry.on_start(&id).unwrap();
        settle().await;
        tokio::time::sleep(INTERVAL * 2 + Duration::from_secs(1)).await;

        // Cycle 0 was rejected by the transport, cycles 1 and 2 arrive
        assert_eq!(provider.calls(), 3);
        let updates = transport.updates_for(&id);
        assert_eq!(updates.len(), 2);
        assert!(matches!(&updates[0], OutboundMessage::Update(s) if s.price == 1.0));
        assert!(registry.is_active(&id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_start_and_disconnect_race_across_threads() {
        let interval = Duration::from_millis(5);

        for round in 0..100 {
            let transport = Arc::new(RecordingTransport::default());
            let registry = Arc::new(SessionRegistry::new(
                transport.clone(),
                Arc::new(ScriptedProvider::default()),
                interval,
            ));
            let id = ClientId::new(format!("client-{round}"));
            registry.on_connect(&id).await.unwrap();

            let starter = {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                tokio::spawn(async move { registry.on_start(&id) })
            };
            let disconnecter = {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                tokio::spawn(async move { registry.on_disconnect(&id).await })
            };

            match starter.await.unwrap() {
                Ok(StartOutcome::Started) | Err(SessionError::UnknownClient(_)) => {}
                other => panic!("unexpected start outcome: {other:?}"),
            }
            assert!(disconnecter.await.unwrap());
            assert_eq!(registry.stats().known_sessions, 0);

            let delivered = transport.updates_for(&id).len();
            tokio::time::sleep(interval * 4).await;
            assert_eq!(transport.updates_for(&id).len(), delivered);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_after_shutdown_is_refused() {
        let provider = Arc::new(ScriptedProvider::default());
        let (registry, transport) = registry_with(provider.clone());
        let id = ClientId::from("late-client");

        registry.shutdown().await;
        assert!(registry.is_closed());

        assert!(matches!(registry.on_connect(&id).await, Err(SessionError::ShuttingDown)));
        assert!(matches!(registry.on_start(&id), Err(SessionError::ShuttingDown)));
        assert!(!registry.is_known(&id));

        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(provider.calls(), 0);
        assert!(transport.messages_for(&id).is_empty());
    }
}
