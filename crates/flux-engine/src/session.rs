use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::info;

use flux_core::types::SessionId;

use crate::blackboard::Blackboard;
use crate::solver::FluxSolver;
use crate::state::FluxState;

/// One consultation: its facts and its flow state.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: SessionId,
    pub(crate) facts: Blackboard,
    pub(crate) state: FluxState,
    pub(crate) started_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self::with_id(SessionId::new())
    }

    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            facts: Blackboard::new(),
            state: FluxState::default(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn facts(&self) -> &Blackboard {
        &self.facts
    }

    /// Changes made here are picked up by the next `run_cycle`.
    pub fn facts_mut(&mut self) -> &mut Blackboard {
        &mut self.facts
    }

    pub fn state(&self) -> &FluxState {
        &self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Sessions of one flow set, each behind its own lock so that different
/// sessions can propagate on different threads.
pub struct SessionManager {
    solver: Arc<FluxSolver>,
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    pub fn new(solver: Arc<FluxSolver>) -> Self {
        Self {
            solver,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn solver(&self) -> &Arc<FluxSolver> {
        &self.solver
    }

    /// Open a session and register it.
    pub fn open(&self) -> SessionId {
        let session = self.solver.open_session();
        let id = session.id().clone();
        info!(session_id = %id, "Session opened");
        self.lock_sessions()
            .insert(id.clone(), Arc::new(Mutex::new(session)));
        id
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.lock_sessions().get(id).cloned()
    }

    /// Run `f` with the solver and exclusive access to one session.
    pub fn with_session<R>(
        &self,
        id: &SessionId,
        f: impl FnOnce(&FluxSolver, &mut Session) -> R,
    ) -> Option<R> {
        let session = self.get(id)?;
        let mut guard = session.lock().unwrap_or_else(|e| e.into_inner());
        Some(f(&self.solver, &mut guard))
    }

    /// Set facts and run one propagation cycle.
    pub fn apply(
        &self,
        id: &SessionId,
        update: impl FnOnce(&mut Blackboard),
    ) -> Option<()> {
        self.with_session(id, |solver, session| {
            update(session.facts_mut());
            solver.run_cycle(session);
        })
    }

    pub fn close(&self, id: &SessionId) -> bool {
        let removed = self.lock_sessions().remove(id).is_some();
        if removed {
            info!(session_id = %id, "Session closed");
        }
        removed
    }

    pub fn list(&self) -> Vec<SessionId> {
        self.lock_sessions().keys().cloned().collect()
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, HashMap<SessionId, Arc<Mutex<Session>>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}
