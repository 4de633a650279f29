//! Session table
//!
//! Uses DashMap so lifecycle operations on one client lock only that client's shard

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use signals_core::{ClientId, SessionError, SessionResult};

use crate::refresh::LoopExit;

/// Handle to the single refresh loop of a running session
pub(crate) struct LoopHandle {
    generation: u64,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<LoopExit>,
}

impl LoopHandle {
    pub(crate) fn new(
        generation: u64,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<LoopExit>,
    ) -> Self {
        Self { generation, shutdown, task }
    }

    /// Signal the loop and hand back its task for joining
    fn cancel(self) -> JoinHandle<LoopExit> {
        let _ = self.shutdown.send(());
        self.task
    }
}

pub(crate) enum SessionState {
    /// Connected, not streaming
    Idle,
    Running(LoopHandle),
}

/// One connected client
pub struct Session {
    state: SessionState,
}

impl Session {
    fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Running(_))
    }

    /// Move to Idle, cancelling the loop if one is running
    fn deactivate(&mut self) -> Option<JoinHandle<LoopExit>> {
        match std::mem::replace(&mut self.state, SessionState::Idle) {
            SessionState::Running(handle) => Some(handle.cancel()),
            SessionState::Idle => None,
        }
    }
}

/// What a refresh loop finds when it checks in at the top of a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    Current,
    /// Removed or stopped
    Gone,
    /// Another loop owns the session
    Superseded { current: u64 },
}

/// Outcome of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// Process-wide client → session mapping
#[derive(Default)]
pub struct SessionTable {
    sessions: DashMap<ClientId, Session>,
    next_generation: AtomicU64,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client as known but idle. Returns false if it was already known.
    pub fn register(&self, client_id: &ClientId) -> bool {
        match self.sessions.entry(client_id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Session::new());
                true
            }
        }
    }

    pub fn is_known(&self, client_id: &ClientId) -> bool {
        self.sessions.contains_key(client_id)
    }

    pub fn is_active(&self, client_id: &ClientId) -> bool {
        self.sessions
            .get(client_id)
            .map(|s| s.is_active())
            .unwrap_or(false)
    }

    /// Start a loop unless one is running. `spawn` runs under the client's lock.
    pub(crate) fn start_with(
        &self,
        client_id: &ClientId,
        spawn: impl FnOnce(u64) -> LoopHandle,
    ) -> SessionResult<StartOutcome> {
        let mut session = self
            .sessions
            .get_mut(client_id)
            .ok_or_else(|| SessionError::UnknownClient(client_id.clone()))?;

        if session.is_active() {
            return Ok(StartOutcome::AlreadyRunning);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        session.state = SessionState::Running(spawn(generation));
        Ok(StartOutcome::Started)
    }

    pub(crate) fn liveness(&self, client_id: &ClientId, generation: u64) -> Liveness {
        match self.sessions.get(client_id).as_deref().map(|s| &s.state) {
            Some(SessionState::Running(handle)) if handle.generation == generation => {
                Liveness::Current
            }
            Some(SessionState::Running(handle)) => Liveness::Superseded {
                current: handle.generation,
            },
            Some(SessionState::Idle) | None => Liveness::Gone,
        }
    }

    /// Back to Idle; the loop is signalled before the client's lock is released
    pub(crate) fn deactivate(&self, client_id: &ClientId) -> Option<JoinHandle<LoopExit>> {
        self.sessions.get_mut(client_id)?.deactivate()
    }

    /// Remove the client; returns its signalled loop, if any
    pub(crate) fn remove(&self, client_id: &ClientId) -> Option<Option<JoinHandle<LoopExit>>> {
        let (_, mut session) = self.sessions.remove(client_id)?;
        Some(session.deactivate())
    }

    /// Remove every client, signalling every loop
    pub(crate) fn drain(&self) -> Vec<(ClientId, JoinHandle<LoopExit>)> {
        let ids: Vec<ClientId> = self.sessions.iter().map(|s| s.key().clone()).collect();

        ids.into_iter()
            .filter_map(|id| {
                let task = self.remove(&id)??;
                Some((id, task))
            })
            .collect()
    }

    pub fn known_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_active()).count()
    }
}
