//! # LLM-Backed Roles
//!
//! The three capability roles behind the pipelines: a planner that turns the
//! problem statement into a [`RequirementSpec`], and two coders that each
//! publish a [`FileList`] under their own context key.

use super::context::{AgentEvent, SharedContext, REQUIREMENTS_KEY};
use super::Agent;
use crate::call_structured;
use crate::models::ModelConfig;
use crate::state::models::{FileList, RequirementSpec};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Which structured output shape a role produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputShape {
    Requirements,
    Files,
}

/// A single LLM-backed capability. Produces one structured result per
/// invocation and publishes it under `output_key` in the shared context.
pub struct LlmAgent {
    name: String,
    output_key: String,
    instruction: &'static str,
    shape: OutputShape,
    config: ModelConfig,
}

impl LlmAgent {
    fn new(
        name: &str,
        output_key: &str,
        instruction: &'static str,
        shape: OutputShape,
        config: ModelConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            output_key: output_key.to_string(),
            instruction,
            shape,
            config,
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        input: String,
        ctx: SharedContext,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<()> {
        // Coders run after (or without) the planner; fold any requirements
        // already present in the context into their prompt.
        let prompt = match self.shape {
            OutputShape::Files => {
                let requirements = { ctx.read().await.state.get(REQUIREMENTS_KEY).cloned() };
                match requirements {
                    Some(spec) => format!("{input}\n\nProject requirements (JSON):\n{spec}"),
                    None => input,
                }
            }
            OutputShape::Requirements => input,
        };

        tracing::debug!(agent = %self.name, model = %self.config.model, "invoking model");

        let (value, summary) = match self.shape {
            OutputShape::Requirements => {
                let spec: RequirementSpec =
                    call_structured!(&self.config, RequirementSpec, self.instruction, prompt.as_str())?;
                let summary = format!(
                    "planned {} component(s), {} complexity",
                    spec.functional_components.len(),
                    spec.complexity
                );
                (serde_json::to_value(spec)?, summary)
            }
            OutputShape::Files => {
                let list: FileList =
                    call_structured!(&self.config, FileList, self.instruction, prompt.as_str())?;
                let summary = format!("generated {} file(s)", list.files.len());
                (serde_json::to_value(list)?, summary)
            }
        };

        {
            let mut guard = ctx.write().await;
            guard.state.insert(self.output_key.clone(), value.clone());
        }

        let event = AgentEvent::new(&self.name)
            .with_text(summary)
            .with_update(&self.output_key, value);
        let _ = events.send(event).await;
        Ok(())
    }
}

/// Requirements analysis role.
pub fn planner(config: ModelConfig) -> LlmAgent {
    LlmAgent::new(
        "Planner",
        REQUIREMENTS_KEY,
        PLANNER_INSTRUCTION,
        OutputShape::Requirements,
        config,
    )
}

/// Frontend generation role.
pub fn frontend_coder(config: ModelConfig) -> LlmAgent {
    LlmAgent::new(
        "FrontendCoder",
        "frontend_files",
        FRONTEND_INSTRUCTION,
        OutputShape::Files,
        config,
    )
}

/// Backend generation role.
pub fn backend_coder(config: ModelConfig) -> LlmAgent {
    LlmAgent::new(
        "BackendCoder",
        "backend_files",
        BACKEND_INSTRUCTION,
        OutputShape::Files,
        config,
    )
}

const PLANNER_INSTRUCTION: &str = include_str!("defaults/planner.md");
const FRONTEND_INSTRUCTION: &str = include_str!("defaults/frontend.md");
const BACKEND_INSTRUCTION: &str = include_str!("defaults/backend.md");
