use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use minijinja_autoreload::AutoReloader;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::llm_interaction::TextGenerator;
use crate::session::CounselSession;

pub use crate::session::SharedSession;

/// In-memory registry of live sessions, keyed by cookie id.
///
/// Holds at most `capacity` sessions. To make room it drops the least
/// recently used session that has no request in flight.
pub struct SessionStore {
    capacity: usize,
    sessions: HashMap<Uuid, SharedSession>,
    // Least recently used first
    order: VecDeque<Uuid>,
}

impl SessionStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            sessions: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Returns the session for `id` and marks it as most recently used.
    pub fn get(&mut self, id: &Uuid) -> Option<SharedSession> {
        let session = self.sessions.get(id).cloned()?;
        if let Some(pos) = self.order.iter().position(|known| known == id) {
            self.order.remove(pos);
        }
        self.order.push_back(*id);
        Some(session)
    }

    pub fn create(&mut self) -> (Uuid, SharedSession) {
        while self.sessions.len() >= self.capacity {
            let Some(victim) = self.eviction_candidate() else { break };
            self.order.retain(|id| *id != victim);
            self.sessions.remove(&victim);
            debug!(session_id = %victim, "Evicted least recently used session");
        }

        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(CounselSession::new()));
        self.sessions.insert(id, session.clone());
        self.order.push_back(id);
        (id, session)
    }

    // Busy sessions are only evicted when every session is busy.
    fn eviction_candidate(&self) -> Option<Uuid> {
        self.order
            .iter()
            .find(|id| self.sessions.get(*id).is_some_and(|session| !is_busy(session)))
            .or_else(|| self.order.front())
            .copied()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

// A session is busy while a request holds its lock or a submission is in flight.
fn is_busy(session: &SharedSession) -> bool {
    session
        .try_lock()
        .map_or(true, |session| session.response().is_loading)
}

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub templates: Arc<AutoReloader>,
    pub generator: Arc<dyn TextGenerator>,
    pub sessions: Arc<Mutex<SessionStore>>,
}

impl AppState {
    pub fn new(templates: AutoReloader, generator: Arc<dyn TextGenerator>, max_sessions: usize) -> Self {
        Self {
            templates: Arc::new(templates),
            generator,
            sessions: Arc::new(Mutex::new(SessionStore::new(max_sessions))),
        }
    }

    /// Looks up the session for `id`, or starts a new one. The returned flag
    /// is true when a new session was created.
    pub async fn session_for(&self, id: Option<Uuid>) -> (Uuid, SharedSession, bool) {
        let mut store = self.sessions.lock().await;
        if let Some(id) = id {
            if let Some(session) = store.get(&id) {
                return (id, session, false);
            }
        }
        let (id, session) = store.create();
        (id, session, true)
    }
}
