//! # Orchestration Engine
//!
//! Drives the agent pipelines against a session: streams capability events,
//! incrementally syncs structured outputs into the project state, reconciles
//! file batches through the smart merge, and runs the bounded self-heal loop.

use super::events::{BuildEvent, BuildEventKind};
use super::merge::merge_files;
use crate::agents::context::{AgentContext, SharedContext, FILE_KEYS, REQUIREMENTS_KEY};
use crate::agents::{
    backend_coder, frontend_coder, planner, Agent, AgentEvent, ParallelAgent, SequentialAgent,
};
use crate::error::{EngineError, EngineResult};
use crate::models::{LlmProvider, ModelConfig};
use crate::state::models::{FileList, GeneratedFile, ProgressStatus, ProjectState, RequirementSpec};
use crate::state::SessionManager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Validation errors beyond this many are dropped from the heal prompt.
/// Bounded-context policy: keeps the prompt from growing without limit.
const HEAL_ERROR_LIMIT: usize = 20;

/// Progress-step details are clipped to this many characters.
const DETAIL_LIMIT: usize = 120;

/// Engine configuration: model selection per role and the heal budget.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub provider: LlmProvider,
    /// Model for every role unless overridden per role.
    pub global_model: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints.
    pub base_url: Option<String>,
    /// Per-role model overrides, keyed by "planner" / "frontend" / "backend".
    pub per_role_models: HashMap<String, String>,
    /// Maximum self-heal attempts per call.
    pub max_heal_retries: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            global_model: None,
            base_url: None,
            per_role_models: HashMap::new(),
            max_heal_retries: 2,
        }
    }
}

impl OrchestratorConfig {
    /// Resolve the model config for one role: per-role override, then the
    /// global model, then the provider default.
    pub fn model_config(&self, role: &str) -> ModelConfig {
        let model = self
            .per_role_models
            .get(role)
            .or(self.global_model.as_ref())
            .cloned()
            .unwrap_or_else(|| self.provider.default_model().to_string());

        let base_url = if self.provider.supports_base_url() {
            self.base_url.clone()
        } else {
            None
        };

        ModelConfig {
            provider: self.provider.clone(),
            model,
            base_url,
        }
    }
}

/// Which structured-output keys an orchestration call syncs from the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncMode {
    /// Build: requirements plus file batches.
    Full,
    /// Refine and self-heal never read the requirements key.
    FilesOnly,
}

/// The orchestration engine.
///
/// Owns its two pipelines outright: the full build pipeline and the
/// refinement pipeline are built from independently constructed capability
/// instances, because composition ties a capability to one parent.
pub struct Orchestrator {
    config: OrchestratorConfig,
    full_pipeline: Arc<dyn Agent>,
    refine_pipeline: Arc<dyn Agent>,
    event_tx: Option<mpsc::Sender<BuildEvent>>,
}

impl Orchestrator {
    /// Engine wired to the LLM-backed roles.
    pub fn new(config: OrchestratorConfig) -> Self {
        let full_pipeline: Arc<dyn Agent> = Arc::new(SequentialAgent::new(
            "BuildPipeline",
            vec![
                Arc::new(planner(config.model_config("planner"))),
                Arc::new(ParallelAgent::new(
                    "Coders",
                    vec![
                        Arc::new(frontend_coder(config.model_config("frontend"))),
                        Arc::new(backend_coder(config.model_config("backend"))),
                    ],
                )),
            ],
        ));

        let refine_pipeline: Arc<dyn Agent> = Arc::new(ParallelAgent::new(
            "RefineCoders",
            vec![
                Arc::new(frontend_coder(config.model_config("frontend"))),
                Arc::new(backend_coder(config.model_config("backend"))),
            ],
        ));

        Self::with_pipelines(config, full_pipeline, refine_pipeline)
    }

    /// Engine over caller-supplied pipelines. The capability boundary is a
    /// trait, so alternate or scripted capabilities plug in here.
    pub fn with_pipelines(
        config: OrchestratorConfig,
        full_pipeline: Arc<dyn Agent>,
        refine_pipeline: Arc<dyn Agent>,
    ) -> Self {
        Self {
            config,
            full_pipeline,
            refine_pipeline,
            event_tx: None,
        }
    }

    /// Stream build events to a presentation sink.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<BuildEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Fire-and-forget notification; sink failures never abort orchestration.
    async fn emit(&self, event: BuildEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Run the full pipeline for a session's problem statement.
    #[tracing::instrument(skip(self, sessions, problem), fields(session = %session_id))]
    pub async fn build(
        &self,
        problem: &str,
        session_id: &str,
        sessions: &SessionManager,
    ) -> EngineResult<ProjectState> {
        let handle = sessions
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let mut state = handle.lock().await;

        let ctx = restore_context(&state);
        state.update_progress("Starting pipeline", ProgressStatus::InProgress, None);
        self.emit(BuildEvent::new(
            BuildEventKind::PipelineStarted,
            session_id,
            "orchestrator",
        ))
        .await;

        let outcome = self
            .drive(
                self.full_pipeline.clone(),
                problem.to_string(),
                ctx.clone(),
                &mut state,
                SyncMode::Full,
            )
            .await;

        match outcome {
            Ok(()) => {
                persist_context(&ctx, &mut state).await;
                state.update_progress("Done", ProgressStatus::Completed, None);
                self.emit(BuildEvent::new(
                    BuildEventKind::PipelineCompleted,
                    session_id,
                    "orchestrator",
                ))
                .await;
                Ok(state.clone())
            }
            Err(err) => {
                state.update_progress("Build failed", ProgressStatus::Error, Some(&err.to_string()));
                self.emit(
                    BuildEvent::new(BuildEventKind::PipelineFailed, session_id, "orchestrator")
                        .with_detail(err.to_string()),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Run the refinement pipeline for a user-driven follow-up change.
    /// Requirements are read for the prompt but never written.
    #[tracing::instrument(skip(self, sessions, instruction), fields(session = %session_id))]
    pub async fn refine(
        &self,
        instruction: &str,
        session_id: &str,
        sessions: &SessionManager,
    ) -> EngineResult<ProjectState> {
        let handle = sessions
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let mut state = handle.lock().await;

        let ctx = restore_context(&state);
        let prompt = refine_prompt(&state, instruction);
        state.update_progress(
            "Refining project",
            ProgressStatus::InProgress,
            Some(&clip(instruction, DETAIL_LIMIT)),
        );
        self.emit(
            BuildEvent::new(BuildEventKind::PipelineStarted, session_id, "orchestrator")
                .with_detail("refinement"),
        )
        .await;

        let outcome = self
            .drive(
                self.refine_pipeline.clone(),
                prompt,
                ctx.clone(),
                &mut state,
                SyncMode::FilesOnly,
            )
            .await;

        match outcome {
            Ok(()) => {
                persist_context(&ctx, &mut state).await;
                state.update_progress("Refinement complete", ProgressStatus::Completed, None);
                self.emit(BuildEvent::new(
                    BuildEventKind::PipelineCompleted,
                    session_id,
                    "orchestrator",
                ))
                .await;
                Ok(state.clone())
            }
            Err(err) => {
                state.update_progress(
                    "Refinement failed",
                    ProgressStatus::Error,
                    Some(&err.to_string()),
                );
                self.emit(
                    BuildEvent::new(BuildEventKind::PipelineFailed, session_id, "orchestrator")
                        .with_detail(err.to_string()),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Bounded retry of generation with validation feedback. Returns after
    /// the first attempt whose pipeline run completes without raising;
    /// whether the errors are actually fixed is the caller's re-validation
    /// to make. Re-raises after the last failed attempt.
    #[tracing::instrument(skip(self, sessions, validation_errors), fields(session = %session_id))]
    pub async fn self_heal(
        &self,
        session_id: &str,
        validation_errors: &[String],
        sessions: &SessionManager,
    ) -> EngineResult<ProjectState> {
        let handle = sessions
            .get(session_id)
            .await
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;
        let mut state = handle.lock().await;

        let max = self.config.max_heal_retries.max(1);
        let summary = validation_errors
            .iter()
            .take(HEAL_ERROR_LIMIT)
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");

        for attempt in 1..=max {
            state.update_progress(
                &format!("Self-healing attempt {attempt}/{max}"),
                ProgressStatus::InProgress,
                Some(&clip(&summary, 200)),
            );
            self.emit(
                BuildEvent::new(BuildEventKind::SelfHealStarted, session_id, "orchestrator")
                    .with_detail(format!("attempt {attempt}/{max}")),
            )
            .await;

            let ctx = restore_context(&state);
            let prompt = heal_prompt(&summary, state.requirements.as_ref());

            match self
                .drive(
                    self.refine_pipeline.clone(),
                    prompt,
                    ctx.clone(),
                    &mut state,
                    SyncMode::FilesOnly,
                )
                .await
            {
                Ok(()) => {
                    persist_context(&ctx, &mut state).await;
                    state.update_progress("Self-heal complete", ProgressStatus::Completed, None);
                    self.emit(BuildEvent::new(
                        BuildEventKind::PipelineCompleted,
                        session_id,
                        "orchestrator",
                    ))
                    .await;
                    return Ok(state.clone());
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "self-heal attempt failed");
                    state.update_progress(
                        &format!("Self-heal attempt {attempt} failed"),
                        ProgressStatus::Error,
                        Some(&err.to_string()),
                    );
                    self.emit(
                        BuildEvent::new(BuildEventKind::PipelineFailed, session_id, "orchestrator")
                            .with_detail(err.to_string()),
                    )
                    .await;
                    if attempt == max {
                        return Err(err);
                    }
                }
            }
        }

        Ok(state.clone())
    }

    /// Drive one pipeline run: spawn it against the shared context, process
    /// its events strictly in emission order, and sync structured outputs
    /// into the project state after every event.
    async fn drive(
        &self,
        pipeline: Arc<dyn Agent>,
        prompt: String,
        ctx: SharedContext,
        state: &mut ProjectState,
        sync: SyncMode,
    ) -> EngineResult<()> {
        let (tx, mut rx) = mpsc::channel::<AgentEvent>(64);
        let runner = {
            let ctx = ctx.clone();
            tokio::spawn(async move { pipeline.run(prompt, ctx, tx).await })
        };

        let session_id = state.project_id.clone();
        let mut events_seen = 0usize;
        while let Some(event) = rx.recv().await {
            events_seen += 1;

            if let Some(text) = event.text.as_deref().filter(|t| !t.is_empty()) {
                let detail = clip(text, DETAIL_LIMIT);
                state.update_progress(&event.author, ProgressStatus::InProgress, Some(&detail));
                self.emit(
                    BuildEvent::new(BuildEventKind::AgentActivity, &session_id, &event.author)
                        .with_detail(detail),
                )
                .await;
            }

            {
                // Keep the ordered history alongside the state the
                // capabilities write themselves.
                ctx.write().await.events.push(event);
            }

            self.sync_outputs(&ctx, state, &session_id, sync).await;
        }

        match runner.await {
            Ok(Ok(())) if events_seen == 0 => Err(EngineError::Pipeline(
                "pipeline finished without emitting any events".to_string(),
            )),
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(EngineError::Pipeline(format!("{err:#}"))),
            Err(err) => Err(EngineError::Pipeline(format!("pipeline task aborted: {err}"))),
        }
    }

    /// Re-scan the context's structured-output keys and fold anything new
    /// into the project state. Runs after every event so sinks see live
    /// updates rather than one batch at the end.
    async fn sync_outputs(
        &self,
        ctx: &SharedContext,
        state: &mut ProjectState,
        session_id: &str,
        sync: SyncMode,
    ) {
        let snapshot = { ctx.read().await.state.clone() };

        if sync == SyncMode::Full {
            if let Some(raw) = snapshot.get(REQUIREMENTS_KEY) {
                match serde_json::from_value::<RequirementSpec>(raw.clone()) {
                    Ok(spec) => {
                        let fresh = state.requirements.is_none();
                        state.requirements = Some(spec);
                        state.update_progress(
                            "Requirements analyzed",
                            ProgressStatus::InProgress,
                            None,
                        );
                        if fresh {
                            self.emit(BuildEvent::new(
                                BuildEventKind::RequirementsReady,
                                session_id,
                                "Planner",
                            ))
                            .await;
                        }
                    }
                    Err(err) => {
                        // Lenient by design: the raw value stays visible in
                        // the persisted context snapshot instead of being
                        // dropped, and the anomaly lands in the progress log.
                        tracing::warn!(error = %err, "requirements output did not match the expected shape");
                        state.update_progress(
                            "Requirements analyzed",
                            ProgressStatus::Error,
                            Some(&format!("unexpected shape: {err}")),
                        );
                    }
                }
            }
        }

        let mut batch: Vec<GeneratedFile> = Vec::new();
        for key in FILE_KEYS {
            let Some(raw) = snapshot.get(key) else { continue };
            match serde_json::from_value::<FileList>(raw.clone()) {
                Ok(list) => {
                    if !list.files.is_empty() {
                        state.update_progress(
                            file_progress_label(key),
                            ProgressStatus::InProgress,
                            None,
                        );
                    }
                    batch.extend(list.files.into_iter().map(GeneratedFile::from_spec));
                }
                Err(err) => {
                    tracing::warn!(key, error = %err, "file output did not match the expected shape");
                    state.update_progress(
                        file_progress_label(key),
                        ProgressStatus::Error,
                        Some(&format!("unexpected shape: {err}")),
                    );
                }
            }
        }

        if !batch.is_empty() {
            let count = batch.len();
            state.files = merge_files(&state.files, batch);
            state.touch();
            self.emit(
                BuildEvent::new(BuildEventKind::FilesMerged, session_id, "orchestrator")
                    .with_detail(format!("{count} file(s)")),
            )
            .await;
        }
    }
}

/// Rebuild the shared context for a call, reusing the persisted snapshot
/// when one exists so refinement keeps prior conversation state.
fn restore_context(state: &ProjectState) -> SharedContext {
    match &state.agent_context {
        Some(snapshot) => AgentContext::restore(&state.project_id, snapshot.clone()),
        None => AgentContext::new(&state.project_id),
    }
    .shared()
}

/// Snapshot the context back onto the project state.
async fn persist_context(ctx: &SharedContext, state: &mut ProjectState) {
    let guard = ctx.read().await;
    state.agent_context = Some(guard.snapshot());
    state.touch();
}

fn file_progress_label(key: &str) -> &'static str {
    match key {
        "frontend_files" => "Frontend files generated",
        _ => "Backend files generated",
    }
}

/// Prompt for a refinement call: preserve the existing spec, return only
/// changed or added files.
fn refine_prompt(state: &ProjectState, instruction: &str) -> String {
    let requirements = state
        .requirements
        .as_ref()
        .and_then(|r| serde_json::to_string(r).ok())
        .unwrap_or_else(|| "none".to_string());
    let paths = state.file_paths().join(", ");

    format!(
        "You are refining an existing project.\n\
         Do NOT re-plan the specification; keep the requirements as they are.\n\
         Return ONLY the files you changed or added for the requested change.\n\n\
         Existing requirements (JSON): {requirements}\n\
         Existing file paths: [{paths}]\n\n\
         Requested change: {instruction}\n"
    )
}

/// Prompt for a self-heal attempt: the validation errors verbatim, plus the
/// requirements when present so the stack stays stable.
fn heal_prompt(errors_summary: &str, requirements: Option<&RequirementSpec>) -> String {
    let mut prompt = format!(
        "The previously generated code failed validation. Fix every error \
         listed below in your output.\n\n\
         Validation errors:\n{errors_summary}\n\n\
         Regenerate the affected files with the errors fixed. All syntax must \
         be valid and every tag closed.\n"
    );
    if let Some(spec) = requirements {
        if let Ok(json) = serde_json::to_string(spec) {
            prompt.push_str(&format!("\nExisting requirements (keep these): {json}\n"));
        }
    }
    prompt
}

/// Char-safe truncation for progress details.
fn clip(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_resolution_order() {
        let mut config = OrchestratorConfig {
            global_model: Some("claude-3-5-haiku-latest".to_string()),
            ..OrchestratorConfig::default()
        };
        config
            .per_role_models
            .insert("planner".to_string(), "claude-opus-4-1".to_string());

        assert_eq!(config.model_config("planner").model, "claude-opus-4-1");
        assert_eq!(config.model_config("frontend").model, "claude-3-5-haiku-latest");

        let defaults = OrchestratorConfig::default();
        assert_eq!(
            defaults.model_config("backend").model,
            LlmProvider::Anthropic.default_model()
        );
    }

    #[test]
    fn test_base_url_only_for_supported_providers() {
        let config = OrchestratorConfig {
            base_url: Some("http://localhost:4000/v1".to_string()),
            ..OrchestratorConfig::default()
        };
        // Anthropic ignores the override.
        assert!(config.model_config("planner").base_url.is_none());

        let config = OrchestratorConfig {
            provider: LlmProvider::OpenAI,
            base_url: Some("http://localhost:4000/v1".to_string()),
            ..OrchestratorConfig::default()
        };
        assert!(config.model_config("planner").base_url.is_some());
    }

    #[test]
    fn test_heal_prompt_contains_errors_and_requirements() {
        let spec = RequirementSpec {
            functional_components: vec!["list".to_string()],
            tech_stack: crate::state::models::TechStack {
                frontend: "React".to_string(),
                backend: "Flask".to_string(),
                database: "none".to_string(),
            },
            clarifications: vec![],
            complexity: "simple".to_string(),
        };
        let prompt = heal_prompt("index.html: Unclosed tag: <div>", Some(&spec));
        assert!(prompt.contains("Unclosed tag"));
        assert!(prompt.contains("React"));
    }

    #[test]
    fn test_clip_is_char_safe() {
        assert_eq!(clip("héllo wörld", 5), "héllo");
        assert_eq!(clip("ab", 10), "ab");
    }
}
