//! In-memory session registry
//!
//! Each session sits behind its own mutex. Handlers take it with
//! `try_lock`, so a second request on a session that is still generating or
//! revising gets `SessionBusy` instead of queueing behind the first.

use curriforge_common::errors::{AppError, Result};
use curriforge_common::metrics;
use curriforge_context::{CompletionStatus, GenerationSession};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

pub struct SessionSlot {
    pub session: GenerationSession,
    /// Outcome of the generation that created the session
    pub status: CompletionStatus,
    last_access: Instant,
}

impl SessionSlot {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_access.elapsed() > ttl
    }
}

pub type SessionGuard = OwnedMutexGuard<SessionSlot>;

pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<SessionSlot>>>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn insert(&self, session: GenerationSession, status: CompletionStatus) -> Uuid {
        let id = session.id();
        let slot = SessionSlot {
            session,
            status,
            last_access: Instant::now(),
        };

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(Mutex::new(slot)));
        metrics::set_active_sessions(sessions.len());
        id
    }

    /// Exclusive access to a session
    pub async fn acquire(&self, id: Uuid) -> Result<SessionGuard> {
        let slot = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::SessionNotFound { id: id.to_string() })?;

        let mut guard = slot
            .try_lock_owned()
            .map_err(|_| AppError::SessionBusy { id: id.to_string() })?;

        if guard.is_expired(self.ttl) {
            drop(guard);
            self.sessions.write().await.remove(&id);
            tracing::debug!(session_id = %id, "Expired session evicted on access");
            return Err(AppError::SessionNotFound { id: id.to_string() });
        }

        guard.last_access = Instant::now();
        Ok(guard)
    }

    /// Drop a session; fails with `SessionBusy` while a request holds it
    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let guard = self.acquire(id).await?;
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id);
        metrics::set_active_sessions(sessions.len());
        drop(guard);
        Ok(())
    }

    /// Evict idle sessions. Sessions currently in use are kept.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(slot) => !slot.is_expired(self.ttl),
            Err(_) => true,
        });
        let purged = before - sessions.len();
        metrics::set_active_sessions(sessions.len());
        if purged > 0 {
            tracing::info!(purged, remaining = sessions.len(), "Expired sessions purged");
        }
        purged
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
