//! # Agent Context
//!
//! The mutable key-value state plus ordered event history shared by every
//! capability within one orchestration call. Each parallel branch writes its
//! structured output under its own well-known key, so the state map is a set
//! of single-writer slots rather than a general shared structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Context handle shared across the capabilities of one pipeline run.
pub type SharedContext = Arc<RwLock<AgentContext>>;

/// Structured-output key written by the planner role.
pub const REQUIREMENTS_KEY: &str = "requirements";
/// Structured-output keys written by the coder roles.
pub const FILE_KEYS: [&str; 2] = ["frontend_files", "backend_files"];

/// One event emitted by a capability while it works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub timestamp: DateTime<Utc>,
    /// Capability that produced this event.
    pub author: String,
    /// Human-readable trace text, surfaced to the progress log when present.
    #[serde(default)]
    pub text: Option<String>,
    /// Keyed structured updates this event merged into the context state.
    #[serde(default)]
    pub state_delta: Map<String, Value>,
}

impl AgentEvent {
    pub fn new(author: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            author: author.to_string(),
            text: None,
            state_delta: Map::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_update(mut self, key: &str, value: Value) -> Self {
        self.state_delta.insert(key.to_string(), value);
        self
    }
}

/// Snapshot of a context, persisted on the project state between calls so
/// multi-turn refinement keeps prior conversation state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextSnapshot {
    #[serde(default)]
    pub state: Map<String, Value>,
    #[serde(default)]
    pub events: Vec<AgentEvent>,
}

/// Shared state for one orchestration call.
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub session_id: String,
    pub state: Map<String, Value>,
    pub events: Vec<AgentEvent>,
}

impl AgentContext {
    /// Fresh context seeded with the session identifier.
    pub fn new(session_id: &str) -> Self {
        let mut state = Map::new();
        state.insert("project_id".to_string(), Value::String(session_id.to_string()));
        Self {
            session_id: session_id.to_string(),
            state,
            events: Vec::new(),
        }
    }

    /// Rehydrate a context from a persisted snapshot.
    pub fn restore(session_id: &str, snapshot: ContextSnapshot) -> Self {
        let mut ctx = Self {
            session_id: session_id.to_string(),
            state: snapshot.state,
            events: snapshot.events,
        };
        ctx.state
            .entry("project_id".to_string())
            .or_insert_with(|| Value::String(session_id.to_string()));
        ctx
    }

    /// Snapshot the state map and event history for persistence.
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            state: self.state.clone(),
            events: self.events.clone(),
        }
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_context_carries_session_id() {
        let ctx = AgentContext::new("proj-1");
        assert_eq!(ctx.state.get("project_id"), Some(&json!("proj-1")));
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn test_restore_keeps_prior_state() {
        let mut snapshot = ContextSnapshot::default();
        snapshot.state.insert("requirements".into(), json!({"complexity": "simple"}));

        let ctx = AgentContext::restore("proj-2", snapshot);
        assert!(ctx.state.contains_key("requirements"));
        assert_eq!(ctx.state.get("project_id"), Some(&json!("proj-2")));
    }

    #[test]
    fn test_event_builder() {
        let event = AgentEvent::new("Planner")
            .with_text("analyzing")
            .with_update("requirements", json!({"complexity": "simple"}));
        assert_eq!(event.author, "Planner");
        assert!(event.state_delta.contains_key("requirements"));
    }
}
