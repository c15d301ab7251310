use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;
use view::SessionViewState;

struct SessionEntry {
    state: SessionViewState,
    last_seen: Instant,
}

/// Live reader sessions. Each entry is only touched by requests carrying
/// its id, and no shard guard is held across an await point.
///
/// Clients that never end their session are dropped by `sweep_idle` once
/// they have been quiet for longer than the configured idle limit.
pub struct SessionRegistry {
    sessions: DashMap<Uuid, SessionEntry>,
    max_chat_messages: usize,
}

impl SessionRegistry {
    pub fn new(max_chat_messages: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_chat_messages,
        }
    }

    pub fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionEntry {
                state: SessionViewState::new(self.max_chat_messages),
                last_seen: Instant::now(),
            },
        );
        info!(session_id = %id, "Session started");
        id
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            info!(session_id = %id, "Session ended");
        }
        removed
    }

    pub fn snapshot(&self, id: &Uuid) -> Option<SessionViewState> {
        self.with_session(id, |s| s.clone())
    }

    /// Run `f` against one session's state; `None` if the session is gone
    pub fn with_session<R>(&self, id: &Uuid, f: impl FnOnce(&mut SessionViewState) -> R) -> Option<R> {
        self.sessions.get_mut(id).map(|mut entry| {
            entry.last_seen = Instant::now();
            f(&mut entry.state)
        })
    }

    /// Drop sessions not used for at least `max_idle`. Returns how many went.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|id, entry| {
            let keep = entry.last_seen.elapsed() < max_idle;
            if !keep {
                debug!(session_id = %id, "Session expired");
            }
            keep
        });
        let expired = before.saturating_sub(self.sessions.len());
        if expired > 0 {
            info!(expired, remaining = self.sessions.len(), "Expired idle sessions");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}
