//! AppForge Server
//!
//! Axum server exposing the orchestration core: session lifecycle, build /
//! refine / self-heal flows, SSE progress events, and an in-memory live
//! preview of the generated application.

use appforge_core::config::AppConfig;
use appforge_core::models::LlmProvider;
use appforge_core::orchestrator::{
    normalize_path, BuildEvent, BuildEventKind, Orchestrator,
};
use appforge_core::state::{ProblemStatement, ProgressStatus, ProjectState, SessionManager};
use appforge_core::validate::validate_project;
use appforge_core::workspace;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Response, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::{get, post},
    Router,
};
use clap::{Parser, Subcommand};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};
use utoipa::{OpenApi, ToSchema};

/// Application state shared by all handlers.
struct AppState {
    config: AppConfig,
    sessions: Arc<SessionManager>,
    orchestrator: Arc<Orchestrator>,
    event_tx: broadcast::Sender<BuildEvent>,
}

type SharedState = Arc<AppState>;

// === CLI ===

#[derive(Parser)]
#[command(author, version, about = "AppForge - AI application scaffolding server")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Start the AppForge server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "9080")]
        port: u16,
    },
    /// Build an application from a problem statement (CLI mode, no server)
    Run {
        /// The problem statement
        problem: String,
    },
}

// === API Types ===

#[derive(Deserialize, ToSchema)]
struct CreateSessionRequest {
    problem: String,
    tech_preferences: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct SessionCreatedResponse {
    session_id: String,
    message: String,
}

#[derive(Serialize, ToSchema)]
struct ApiResponse {
    success: bool,
    message: String,
}

#[derive(Deserialize, ToSchema)]
struct RefineRequest {
    instruction: String,
}

#[derive(Deserialize, ToSchema, Default)]
struct HealRequest {
    /// Errors to feed the heal prompt; defaults to the stored validation
    /// errors when empty.
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Serialize, ToSchema)]
struct RequirementsResponse {
    functional_components: Vec<String>,
    frontend: String,
    backend: String,
    database: String,
    clarifications: Vec<String>,
    complexity: String,
}

#[derive(Serialize, ToSchema)]
struct ProgressStepResponse {
    name: String,
    status: String,
    timestamp: String,
    details: Option<String>,
}

#[derive(Serialize, ToSchema)]
struct ValidationResponse {
    passed: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

#[derive(Serialize, ToSchema)]
struct FileEntryResponse {
    path: String,
    language: String,
    size: usize,
}

#[derive(Serialize, ToSchema)]
struct SessionStateResponse {
    session_id: String,
    problem: String,
    requirements: Option<RequirementsResponse>,
    validation: Option<ValidationResponse>,
    progress: Vec<ProgressStepResponse>,
    files: Vec<FileEntryResponse>,
    created_at: String,
    updated_at: String,
}

#[derive(Serialize, ToSchema)]
struct FilesResponse {
    files: Vec<FileEntryResponse>,
}

#[derive(Serialize, ToSchema)]
struct ExportResponse {
    success: bool,
    path: String,
    files: Vec<String>,
}

#[derive(Serialize, ToSchema)]
struct ProviderInfo {
    id: String,
    name: String,
    default_model: String,
    supports_base_url: bool,
    env_var: String,
}

#[derive(Serialize, ToSchema)]
struct ProvidersResponse {
    providers: Vec<ProviderInfo>,
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "AppForge API",
        version = "1.0.0",
        description = "API for the AppForge application scaffolding orchestrator"
    ),
    paths(
        create_session,
        get_session,
        delete_session,
        refine_session,
        heal_session,
        list_files,
        export_session,
        get_providers
    ),
    components(schemas(
        CreateSessionRequest,
        SessionCreatedResponse,
        ApiResponse,
        RefineRequest,
        HealRequest,
        RequirementsResponse,
        ProgressStepResponse,
        ValidationResponse,
        FileEntryResponse,
        SessionStateResponse,
        FilesResponse,
        ExportResponse,
        ProviderInfo,
        ProvidersResponse
    )),
    tags(
        (name = "sessions", description = "Build session lifecycle"),
        (name = "providers", description = "LLM provider discovery")
    )
)]
struct ApiDoc;

// === Response mapping ===

fn status_label(status: ProgressStatus) -> &'static str {
    match status {
        ProgressStatus::Pending => "pending",
        ProgressStatus::InProgress => "in_progress",
        ProgressStatus::Completed => "completed",
        ProgressStatus::Error => "error",
    }
}

fn provider_id(provider: &LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Anthropic => "anthropic",
        LlmProvider::OpenAI => "openai",
        LlmProvider::Gemini => "gemini",
    }
}

fn file_entries(state: &ProjectState) -> Vec<FileEntryResponse> {
    state
        .files
        .iter()
        .map(|f| FileEntryResponse {
            path: f.path.clone(),
            language: f.language.clone(),
            size: f.size(),
        })
        .collect()
}

fn session_response(state: &ProjectState) -> SessionStateResponse {
    SessionStateResponse {
        session_id: state.project_id.clone(),
        problem: state.problem_statement.description.clone(),
        requirements: state.requirements.as_ref().map(|r| RequirementsResponse {
            functional_components: r.functional_components.clone(),
            frontend: r.tech_stack.frontend.clone(),
            backend: r.tech_stack.backend.clone(),
            database: r.tech_stack.database.clone(),
            clarifications: r.clarifications.clone(),
            complexity: r.complexity.clone(),
        }),
        validation: state.validation.as_ref().map(|v| ValidationResponse {
            passed: v.passed,
            errors: v.errors.clone(),
            warnings: v.warnings.clone(),
        }),
        progress: state
            .progress_log
            .iter()
            .map(|s| ProgressStepResponse {
                name: s.name.clone(),
                status: status_label(s.status).to_string(),
                timestamp: s.timestamp.to_rfc3339(),
                details: s.details.clone(),
            })
            .collect(),
        files: file_entries(state),
        created_at: state.created_at.to_rfc3339(),
        updated_at: state.updated_at.to_rfc3339(),
    }
}

// === Orchestration flows ===

/// Full build flow: build, validate, self-heal on failure, re-validate.
async fn run_build_flow(state: SharedState, session_id: String, problem: String) {
    match state
        .orchestrator
        .build(&problem, &session_id, &state.sessions)
        .await
    {
        Ok(_) => run_validation_cycle(&state, &session_id).await,
        Err(err) => tracing::error!(session = %session_id, error = %err, "build failed"),
    }
}

/// Refinement flow: refine, then the same validation cycle as a build.
async fn run_refine_flow(state: SharedState, session_id: String, instruction: String) {
    match state
        .orchestrator
        .refine(&instruction, &session_id, &state.sessions)
        .await
    {
        Ok(_) => run_validation_cycle(&state, &session_id).await,
        Err(err) => tracing::error!(session = %session_id, error = %err, "refinement failed"),
    }
}

/// Run the validation gate over the session's files; on failure hand the
/// error list to the self-heal loop and validate once more.
async fn run_validation_cycle(state: &SharedState, session_id: &str) {
    let Some(errors) = store_validation(state, session_id).await else {
        return;
    };

    if errors.is_empty() {
        return;
    }

    match state
        .orchestrator
        .self_heal(session_id, &errors, &state.sessions)
        .await
    {
        Ok(_) => {
            let remaining = store_validation(state, session_id).await.unwrap_or_default();
            if remaining.is_empty() {
                tracing::info!(session = %session_id, "self-heal cleared all validation errors");
            } else {
                tracing::warn!(
                    session = %session_id,
                    remaining = remaining.len(),
                    "validation errors remain after self-heal"
                );
            }
        }
        Err(err) => tracing::error!(session = %session_id, error = %err, "self-heal failed"),
    }
}

/// Validate the session's current files, store the outcome on the state, and
/// return the error list.
async fn store_validation(state: &SharedState, session_id: &str) -> Option<Vec<String>> {
    let handle = state.sessions.get(session_id).await?;
    let (errors, passed) = {
        let mut session = handle.lock().await;
        let result = validate_project(&session.files);
        let errors = result.errors.clone();
        let passed = result.passed;
        session.update_progress(
            "Validation & Testing",
            if passed {
                ProgressStatus::Completed
            } else {
                ProgressStatus::Error
            },
            Some(&if passed {
                "All checks passed".to_string()
            } else {
                format!("{} error(s) found", errors.len())
            }),
        );
        session.validation = Some(result);
        session.touch();
        (errors, passed)
    };

    let detail = if passed {
        "passed".to_string()
    } else {
        format!("{} error(s)", errors.len())
    };
    let _ = state.event_tx.send(
        BuildEvent::new(BuildEventKind::ValidationCompleted, session_id, "validator")
            .with_detail(detail),
    );

    Some(errors)
}

// === API Handlers ===

/// Create a session and start the full build in the background
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 200, description = "Session created, build started", body = SessionCreatedResponse)
    )
)]
async fn create_session(
    State(state): State<SharedState>,
    Json(req): Json<CreateSessionRequest>,
) -> Json<SessionCreatedResponse> {
    let mut problem = ProblemStatement::new(req.problem.as_str());
    problem.tech_preferences = req.tech_preferences;

    let session_id = state.sessions.create(problem).await;
    tracing::info!(session = %session_id, "starting generation");

    tokio::spawn(run_build_flow(state.clone(), session_id.clone(), req.problem));

    Json(SessionCreatedResponse {
        message: format!("Build started for session {session_id}"),
        session_id,
    })
}

/// Get the full state of a session
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session state", body = SessionStateResponse),
        (status = 404, description = "Unknown session")
    )
)]
async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.snapshot(&id).await {
        Some(session) => Json(session_response(&session)).into_response(),
        None => (StatusCode::NOT_FOUND, "session not found").into_response(),
    }
}

/// Evict a session
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{id}",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Eviction result", body = ApiResponse)
    )
)]
async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<ApiResponse> {
    let removed = state.sessions.remove(&id).await;
    Json(ApiResponse {
        success: removed,
        message: if removed {
            format!("Session {id} removed")
        } else {
            "No such session".to_string()
        },
    })
}

/// Apply a chat-style refinement to a built session
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/refine",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    request_body = RefineRequest,
    responses(
        (status = 200, description = "Refinement started", body = ApiResponse),
        (status = 404, description = "Unknown session")
    )
)]
async fn refine_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<RefineRequest>,
) -> impl IntoResponse {
    if state.sessions.get(&id).await.is_none() {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    }

    tokio::spawn(run_refine_flow(state.clone(), id.clone(), req.instruction));

    Json(ApiResponse {
        success: true,
        message: format!("Refinement started for session {id}"),
    })
    .into_response()
}

/// Trigger the self-heal loop manually
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/heal",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    request_body = HealRequest,
    responses(
        (status = 200, description = "Self-heal started", body = ApiResponse),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Nothing to heal")
    )
)]
async fn heal_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<HealRequest>,
) -> impl IntoResponse {
    let Some(session) = state.sessions.snapshot(&id).await else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    let errors = if req.errors.is_empty() {
        session
            .validation
            .map(|v| v.errors)
            .unwrap_or_default()
    } else {
        req.errors
    };

    if errors.is_empty() {
        return (StatusCode::CONFLICT, "no validation errors to heal").into_response();
    }

    let state = state.clone();
    tokio::spawn(async move {
        match state
            .orchestrator
            .self_heal(&id, &errors, &state.sessions)
            .await
        {
            Ok(_) => {
                let _ = store_validation(&state, &id).await;
            }
            Err(err) => tracing::error!(session = %id, error = %err, "self-heal failed"),
        }
    });

    Json(ApiResponse {
        success: true,
        message: "Self-heal started".to_string(),
    })
    .into_response()
}

/// List a session's generated files
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{id}/files",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Generated files", body = FilesResponse),
        (status = 404, description = "Unknown session")
    )
)]
async fn list_files(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.snapshot(&id).await {
        Some(session) => Json(FilesResponse {
            files: file_entries(&session),
        })
        .into_response(),
        None => (StatusCode::NOT_FOUND, "session not found").into_response(),
    }
}

/// Raw content of one generated file
async fn get_file(
    State(state): State<SharedState>,
    Path((id, path)): Path<(String, String)>,
) -> impl IntoResponse {
    let Some(session) = state.sessions.snapshot(&id).await else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    let wanted = normalize_path(&path);
    match session.files.iter().find(|f| f.path == wanted) {
        Some(file) => {
            let mime = mime_guess::from_path(&file.path).first_or_text_plain();
            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, mime.as_ref())
                .body(Body::from(file.content.clone()))
                .unwrap()
        }
        None => (StatusCode::NOT_FOUND, "file not found").into_response(),
    }
}

/// Export a session's files under the output directory
#[utoipa::path(
    post,
    path = "/api/v1/sessions/{id}/export",
    tag = "sessions",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Export result", body = ExportResponse),
        (status = 404, description = "Unknown session")
    )
)]
async fn export_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(session) = state.sessions.snapshot(&id).await else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    let project_dir = state.config.output_dir.join(&id);
    match workspace::write_project(&session.files, &project_dir).await {
        Ok(dir) => {
            if let Err(err) =
                workspace::cleanup_old_projects(&state.config.output_dir, state.config.keep_recent)
                    .await
            {
                tracing::warn!(error = %err, "project cleanup failed");
            }
            Json(ExportResponse {
                success: true,
                path: dir.display().to_string(),
                files: workspace::project_tree(&dir),
            })
            .into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("export failed: {err}"),
        )
            .into_response(),
    }
}

/// Available LLM providers
#[utoipa::path(
    get,
    path = "/api/v1/providers",
    tag = "providers",
    responses(
        (status = 200, description = "Supported LLM providers", body = ProvidersResponse)
    )
)]
async fn get_providers() -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: LlmProvider::all()
            .iter()
            .map(|p| ProviderInfo {
                id: provider_id(p).to_string(),
                name: p.display_name().to_string(),
                default_model: p.default_model().to_string(),
                supports_base_url: p.supports_base_url(),
                env_var: p.env_key().to_string(),
            })
            .collect(),
    })
}

/// SSE endpoint for real-time build events with heartbeat
async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_tx.subscribe();

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            let timeout =
                tokio::time::timeout(std::time::Duration::from_secs(15), rx.recv()).await;
            return match timeout {
                Ok(Ok(event)) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    Some((Ok(Event::default().data(json)), rx))
                }
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) => None,
                Err(_) => Some((Ok(Event::default().comment("heartbeat")), rx)),
            };
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// === Live Preview ===

/// Entry point of the generated app: `index.html`, or the first HTML file.
async fn preview_entry(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(session) = state.sessions.snapshot(&id).await else {
        return (StatusCode::NOT_FOUND, "session not found").into_response();
    };

    let entry = session
        .files
        .iter()
        .find(|f| f.path == "index.html")
        .or_else(|| session.files.iter().find(|f| f.language == "html"));

    match entry {
        Some(file) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/html")
            .body(Body::from(file.content.clone()))
            .unwrap(),
        None => (StatusCode::NOT_FOUND, "no previewable entry point yet").into_response(),
    }
}

/// Any other generated asset referenced by the entry page.
async fn preview_asset(
    State(state): State<SharedState>,
    Path((id, path)): Path<(String, String)>,
) -> impl IntoResponse {
    get_file(State(state), Path((id, path))).await
}

async fn serve_openapi() -> impl IntoResponse {
    let spec = ApiDoc::openapi().to_json().unwrap_or_default();
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(spec))
        .unwrap()
}

// === Server Entry ===

fn build_state(config: AppConfig) -> SharedState {
    let (event_tx, _) = broadcast::channel::<BuildEvent>(100);
    let (engine_tx, mut engine_rx) = mpsc::channel::<BuildEvent>(100);

    let orchestrator =
        Arc::new(Orchestrator::new(config.orchestrator.clone()).with_event_channel(engine_tx));

    // Bridge engine events into the broadcast stream for SSE subscribers.
    let broadcast_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = engine_rx.recv().await {
            let _ = broadcast_tx.send(event);
        }
    });

    Arc::new(AppState {
        config,
        sessions: Arc::new(SessionManager::new()),
        orchestrator,
        event_tx,
    })
}

async fn run_server(port: u16) -> anyhow::Result<()> {
    let state = build_state(AppConfig::from_env());

    let session_routes = Router::new()
        .route("/", post(create_session))
        .route("/:id", get(get_session).delete(delete_session))
        .route("/:id/refine", post(refine_session))
        .route("/:id/heal", post(heal_session))
        .route("/:id/files", get(list_files))
        .route("/:id/files/*path", get(get_file))
        .route("/:id/export", post(export_session));

    let app = Router::new()
        .nest("/api/v1/sessions", session_routes)
        .route("/api/v1/events", get(events))
        .route("/api/v1/providers", get(get_providers))
        .route("/api/v1/openapi.json", get(serve_openapi))
        .route("/preview/:id", get(preview_entry))
        .route("/preview/:id/*path", get(preview_asset))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("AppForge server running at http://{addr}");
    println!("  Sessions:  POST /api/v1/sessions, GET /api/v1/sessions/:id");
    println!("  Refine:    POST /api/v1/sessions/:id/refine");
    println!("  Events:    GET  /api/v1/events (SSE)");
    println!("  Preview:   GET  /preview/:id");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// One-shot console mode: build, validate, heal, export, print a summary.
async fn run_once(problem: String) -> anyhow::Result<()> {
    let state = build_state(AppConfig::from_env());

    let session_id = state
        .sessions
        .create(ProblemStatement::new(problem.as_str()))
        .await;
    println!("Building session {session_id}...");

    run_build_flow(state.clone(), session_id.clone(), problem).await;

    let Some(session) = state.sessions.snapshot(&session_id).await else {
        anyhow::bail!("session disappeared during build");
    };

    println!("Generated {} file(s):", session.files.len());
    for file in &session.files {
        println!("  {} ({}, {} bytes)", file.path, file.language, file.size());
    }
    if let Some(validation) = &session.validation {
        if validation.passed {
            println!("Validation: passed");
        } else {
            println!("Validation: {} error(s) remain", validation.errors.len());
        }
    }

    let project_dir = state.config.output_dir.join(&session_id);
    workspace::write_project(&session.files, &project_dir).await?;
    println!("Exported to {}", project_dir.display());

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("==============================");
    println!("        APPFORGE SERVER       ");
    println!("==============================");

    let args = Args::parse();
    match args.command {
        Some(CliCommand::Run { problem }) => run_once(problem).await,
        Some(CliCommand::Serve { port }) => run_server(port).await,
        None => run_server(9080).await,
    }
}
