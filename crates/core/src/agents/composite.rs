//! # Composition Primitives
//!
//! Sequential and parallel arrangements of capabilities over one shared
//! context. Parallel members rely on the disjoint-output-key convention:
//! each branch owns its slot in the context state, so no further
//! coordination is needed beyond the context lock.

use super::context::{AgentEvent, SharedContext};
use super::Agent;
use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Runs members one after another on the same context. Later members observe
/// state written by earlier ones.
pub struct SequentialAgent {
    name: String,
    members: Vec<Arc<dyn Agent>>,
}

impl SequentialAgent {
    pub fn new(name: impl Into<String>, members: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }
}

#[async_trait]
impl Agent for SequentialAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        input: String,
        ctx: SharedContext,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<()> {
        for member in &self.members {
            member.run(input.clone(), ctx.clone(), events.clone()).await?;
        }
        Ok(())
    }
}

/// Runs members concurrently against the same context. Output keys must be
/// disjoint (one key per member); the first failing member fails the
/// composition and aborts the rest.
pub struct ParallelAgent {
    name: String,
    members: Vec<Arc<dyn Agent>>,
}

impl ParallelAgent {
    pub fn new(name: impl Into<String>, members: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }
}

#[async_trait]
impl Agent for ParallelAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        input: String,
        ctx: SharedContext,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<()> {
        let mut branches = JoinSet::new();
        for member in &self.members {
            let member = Arc::clone(member);
            let input = input.clone();
            let ctx = ctx.clone();
            let events = events.clone();
            branches.spawn(async move { member.run(input, ctx, events).await });
        }

        while let Some(joined) = branches.join_next().await {
            joined.map_err(|e| anyhow!("parallel branch panicked: {e}"))??;
        }
        Ok(())
    }
}
