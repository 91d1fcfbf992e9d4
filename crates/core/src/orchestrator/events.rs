//! # Build Events
//!
//! Events streamed to presentation sinks while the engine drives a pipeline.
//! Delivery is fire-and-forget: a sink that stops listening never stalls or
//! aborts orchestration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of build event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildEventKind {
    /// A pipeline run started (build, refine, or a heal attempt)
    PipelineStarted,
    /// A capability reported trace text
    AgentActivity,
    /// The plan stage produced a requirement spec
    RequirementsReady,
    /// A file batch was merged into the session's file set
    FilesMerged,
    /// Pipeline run finished
    PipelineCompleted,
    /// Pipeline run raised
    PipelineFailed,
    /// A self-heal attempt started
    SelfHealStarted,
    /// Validation finished (emitted by the caller running the gate)
    ValidationCompleted,
}

/// An event on the presentation stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: BuildEventKind,
    pub session_id: String,
    /// Capability or component that produced the event.
    pub agent: String,
    #[serde(default)]
    pub detail: Option<String>,
}

impl BuildEvent {
    pub fn new(kind: BuildEventKind, session_id: &str, agent: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            session_id: session_id.to_string(),
            agent: agent.to_string(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}
