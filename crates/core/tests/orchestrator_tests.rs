//! End-to-end orchestration scenarios driven through scripted capabilities.

use appforge_core::agents::{Agent, AgentEvent, ParallelAgent, SequentialAgent, SharedContext};
use appforge_core::error::EngineError;
use appforge_core::orchestrator::{Orchestrator, OrchestratorConfig};
use appforge_core::state::{ProblemStatement, ProgressStatus, SessionManager};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Publishes a canned value under its output key, like a real role would.
struct ScriptedAgent {
    name: String,
    key: String,
    value: Value,
}

impl ScriptedAgent {
    fn new(name: &str, key: &str, value: Value) -> Arc<dyn Agent> {
        Arc::new(Self {
            name: name.to_string(),
            key: key.to_string(),
            value,
        })
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        _input: String,
        ctx: SharedContext,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<()> {
        ctx.write()
            .await
            .state
            .insert(self.key.clone(), self.value.clone());
        let _ = events
            .send(
                AgentEvent::new(&self.name)
                    .with_text("output ready")
                    .with_update(&self.key, self.value.clone()),
            )
            .await;
        Ok(())
    }
}

/// Fails until `succeed_after` invocations have happened, then behaves like
/// a scripted coder.
struct FlakyAgent {
    calls: Arc<AtomicUsize>,
    succeed_after: usize,
    value: Value,
}

#[async_trait]
impl Agent for FlakyAgent {
    fn name(&self) -> &str {
        "FlakyCoder"
    }

    async fn run(
        &self,
        _input: String,
        ctx: SharedContext,
        events: mpsc::Sender<AgentEvent>,
    ) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.succeed_after {
            anyhow::bail!("model backend unavailable (call {call})");
        }
        ctx.write()
            .await
            .state
            .insert("frontend_files".to_string(), self.value.clone());
        let _ = events
            .send(AgentEvent::new("FlakyCoder").with_update("frontend_files", self.value.clone()))
            .await;
        Ok(())
    }
}

fn requirements_value() -> Value {
    json!({
        "functional_components": ["list", "add", "delete"],
        "tech_stack": {"frontend": "React", "backend": "Flask", "database": "none"},
        "clarifications": [],
        "complexity": "simple"
    })
}

fn frontend_value(content: &str) -> Value {
    json!({"files": [{"path": "/index.html", "content": content, "language": "html"}]})
}

fn backend_value() -> Value {
    json!({"files": [{"path": "app.py", "content": "print('api')", "language": "python"}]})
}

/// Full pipeline wired from scripted planner and coders, refinement pipeline
/// from separate instances, matching the real composition shapes.
fn scripted_orchestrator(refine_frontend: Value) -> Orchestrator {
    let full = Arc::new(SequentialAgent::new(
        "BuildPipeline",
        vec![
            ScriptedAgent::new("Planner", "requirements", requirements_value()),
            Arc::new(ParallelAgent::new(
                "Coders",
                vec![
                    ScriptedAgent::new("FrontendCoder", "frontend_files", frontend_value("<!DOCTYPE html><html></html>")),
                    ScriptedAgent::new("BackendCoder", "backend_files", backend_value()),
                ],
            )),
        ],
    ));
    let refine = Arc::new(ParallelAgent::new(
        "RefineCoders",
        vec![ScriptedAgent::new("FrontendCoder", "frontend_files", refine_frontend)],
    ));
    Orchestrator::with_pipelines(OrchestratorConfig::default(), full, refine)
}

#[tokio::test]
async fn build_produces_merged_files_and_requirements() {
    let sessions = SessionManager::new();
    let id = sessions.create(ProblemStatement::new("a todo list app")).await;
    let engine = scripted_orchestrator(frontend_value("<!-- updated -->"));

    let state = engine.build("a todo list app", &id, &sessions).await.unwrap();

    let mut paths = state.file_paths();
    paths.sort();
    assert_eq!(paths, vec!["app.py", "index.html"]);

    let requirements = state.requirements.as_ref().unwrap();
    assert_eq!(requirements.complexity, "simple");
    assert_eq!(requirements.tech_stack.frontend, "React");

    // Context snapshot persisted for the next call.
    let snapshot = state.agent_context.as_ref().unwrap();
    assert!(snapshot.state.contains_key("requirements"));
    assert!(!snapshot.events.is_empty());

    let done = state.progress_log.iter().find(|s| s.name == "Done").unwrap();
    assert_eq!(done.status, ProgressStatus::Completed);
}

#[tokio::test]
async fn refine_updates_files_but_never_requirements() {
    let sessions = SessionManager::new();
    let id = sessions.create(ProblemStatement::new("a todo list app")).await;
    let engine = scripted_orchestrator(frontend_value("<!-- due dates -->"));

    engine.build("a todo list app", &id, &sessions).await.unwrap();
    let before = sessions.snapshot(&id).await.unwrap().requirements;

    // The refinement pipeline even writes a conflicting requirements slot;
    // the engine must not read it during refine.
    let refine = Arc::new(ParallelAgent::new(
        "RefineCoders",
        vec![
            ScriptedAgent::new("FrontendCoder", "frontend_files", frontend_value("<!-- due dates -->")),
            ScriptedAgent::new("RoguePlanner", "requirements", json!({"complexity": "complex"})),
        ],
    ));
    let engine = Orchestrator::with_pipelines(
        OrchestratorConfig::default(),
        Arc::new(SequentialAgent::new("unused", vec![])),
        refine,
    );

    let state = engine.refine("add a due date field", &id, &sessions).await.unwrap();

    assert_eq!(state.files.len(), 2);
    let index = state.files.iter().find(|f| f.path == "index.html").unwrap();
    assert_eq!(index.content, "<!-- due dates -->");
    let backend = state.files.iter().find(|f| f.path == "app.py").unwrap();
    assert_eq!(backend.content, "print('api')");
    assert_eq!(state.requirements, before);
}

#[tokio::test]
async fn build_fails_for_unknown_session() {
    let sessions = SessionManager::new();
    let engine = scripted_orchestrator(frontend_value(""));

    let err = engine.build("anything", "missing", &sessions).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionNotFound(_)));
}

#[tokio::test]
async fn build_failure_is_logged_then_propagated() {
    let sessions = SessionManager::new();
    let id = sessions.create(ProblemStatement::new("x")).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let failing: Arc<dyn Agent> = Arc::new(FlakyAgent {
        calls,
        succeed_after: usize::MAX,
        value: json!(null),
    });
    let engine = Orchestrator::with_pipelines(
        OrchestratorConfig::default(),
        failing.clone(),
        failing,
    );

    let err = engine.build("x", &id, &sessions).await.unwrap_err();
    assert!(matches!(err, EngineError::Pipeline(_)));

    let state = sessions.snapshot(&id).await.unwrap();
    let failed = state.progress_log.iter().find(|s| s.name == "Build failed").unwrap();
    assert_eq!(failed.status, ProgressStatus::Error);
    assert!(failed.details.as_deref().unwrap().contains("unavailable"));
}

#[tokio::test]
async fn self_heal_stops_after_retry_budget() {
    let sessions = SessionManager::new();
    let id = sessions.create(ProblemStatement::new("x")).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let failing: Arc<dyn Agent> = Arc::new(FlakyAgent {
        calls: calls.clone(),
        succeed_after: usize::MAX,
        value: json!(null),
    });
    let engine = Orchestrator::with_pipelines(
        OrchestratorConfig::default(),
        failing.clone(),
        failing,
    );

    let errors = vec!["index.html: Unclosed tag: <div>".to_string()];
    let err = engine.self_heal(&id, &errors, &sessions).await.unwrap_err();
    assert!(matches!(err, EngineError::Pipeline(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let state = sessions.snapshot(&id).await.unwrap();
    for name in ["Self-healing attempt 1/2", "Self-healing attempt 2/2"] {
        assert!(state.progress_log.iter().any(|s| s.name == name), "missing step {name}");
    }
}

#[tokio::test]
async fn self_heal_returns_after_first_clean_run() {
    let sessions = SessionManager::new();
    let id = sessions.create(ProblemStatement::new("x")).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let flaky: Arc<dyn Agent> = Arc::new(FlakyAgent {
        calls: calls.clone(),
        succeed_after: 1,
        value: frontend_value("<!DOCTYPE html><html></html>"),
    });
    let engine = Orchestrator::with_pipelines(
        OrchestratorConfig::default(),
        flaky.clone(),
        flaky,
    );

    let errors = vec!["index.html: Missing DOCTYPE declaration".to_string()];
    let state = engine.self_heal(&id, &errors, &sessions).await.unwrap();

    // Attempt 1 failed, attempt 2 succeeded, no third invocation.
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(state.files.len(), 1);
    assert!(state.progress_log.iter().any(|s| s.name == "Self-heal complete"));
}

#[tokio::test]
async fn silent_pipeline_is_a_surfaced_defect() {
    struct Silent;

    #[async_trait]
    impl Agent for Silent {
        fn name(&self) -> &str {
            "Silent"
        }
        async fn run(
            &self,
            _input: String,
            _ctx: SharedContext,
            _events: mpsc::Sender<AgentEvent>,
        ) -> anyhow::Result<()> {
            Ok(())
        }
    }

    let sessions = SessionManager::new();
    let id = sessions.create(ProblemStatement::new("x")).await;
    let silent: Arc<dyn Agent> = Arc::new(Silent);
    let engine = Orchestrator::with_pipelines(OrchestratorConfig::default(), silent.clone(), silent);

    let err = engine.build("x", &id, &sessions).await.unwrap_err();
    assert!(err.to_string().contains("without emitting"));
}
