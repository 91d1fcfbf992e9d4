//! # Agent Capabilities
//!
//! A capability is a unit of work that consumes a prompt plus the shared
//! context and produces structured output through an asynchronous event
//! stream. The LLM-backed roles live in `llm`; `composite` arranges
//! capabilities sequentially or in parallel.

pub mod composite;
pub mod context;
pub mod llm;

pub use composite::{ParallelAgent, SequentialAgent};
pub use context::{AgentContext, AgentEvent, ContextSnapshot, SharedContext};
pub use llm::{backend_coder, frontend_coder, planner, LlmAgent};

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A single capability in a pipeline.
///
/// Implementations write their structured output into the shared context
/// under their own well-known key before returning, and emit an
/// [`AgentEvent`] carrying the same update so the driver can react
/// incrementally. The event stream for a capability ends when `run` returns;
/// a capability that completes without ever producing output is a defect the
/// driver surfaces rather than swallowing.
///
/// A capability instance belongs to exactly one composed pipeline. Roles
/// needed by several pipelines get independently constructed instances.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        input: String,
        ctx: SharedContext,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<()>;
}
