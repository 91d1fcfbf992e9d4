//! # Session Manager
//!
//! Process-wide table of build sessions. Entries are created at build start
//! and removed only by explicit eviction; the core never deletes them itself.
//!
//! Each entry hands out its state behind a per-session `Mutex`: the engine
//! holds that lock for the whole of a `build`/`refine`/`self_heal` call, so
//! concurrent orchestration on the same session serializes instead of
//! interleaving.

use super::models::{ProblemStatement, ProjectState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Handle to one session's state, locked per orchestration call.
pub type SessionHandle = Arc<Mutex<ProjectState>>;

/// Keyed lookup/creation of project state records.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session and return its id.
    pub async fn create(&self, problem_statement: ProblemStatement) -> String {
        let id = new_session_id();
        let state = ProjectState::new(&id, problem_statement);
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(state)));
        id
    }

    /// Look up a session's state handle.
    pub async fn get(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Clone the current state for read-only consumers. Waits for any
    /// in-flight orchestration call on the session to release its lock.
    pub async fn snapshot(&self, session_id: &str) -> Option<ProjectState> {
        let handle = self.get(session_id).await?;
        let state = handle.lock().await;
        Some(state.clone())
    }

    /// Explicit eviction. Returns whether the session existed.
    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }
}

/// Generate a session id: nanosecond timestamp plus a hash salt. Unique
/// enough for a process-local table without pulling in a uuid dependency.
pub(crate) fn new_session_id() -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    format!("proj-{:x}-{:x}", nanos, hash_salt())
}

fn hash_salt() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::models::ProgressStatus;

    #[tokio::test]
    async fn test_create_and_lookup() {
        let manager = SessionManager::new();
        let id = manager.create(ProblemStatement::new("a todo list app")).await;

        let snapshot = manager.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.project_id, id);
        assert_eq!(snapshot.problem_statement.description, "a todo list app");
        assert!(manager.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_mutations_visible_through_snapshot() {
        let manager = SessionManager::new();
        let id = manager.create(ProblemStatement::new("x")).await;

        {
            let handle = manager.get(&id).await.unwrap();
            let mut state = handle.lock().await;
            state.update_progress("Starting pipeline", ProgressStatus::InProgress, None);
        }

        let snapshot = manager.snapshot(&id).await.unwrap();
        assert_eq!(snapshot.progress_log.len(), 1);
    }

    #[tokio::test]
    async fn test_explicit_eviction() {
        let manager = SessionManager::new();
        let id = manager.create(ProblemStatement::new("x")).await;
        assert!(manager.remove(&id).await);
        assert!(!manager.remove(&id).await);
        assert!(manager.get(&id).await.is_none());
    }
}
