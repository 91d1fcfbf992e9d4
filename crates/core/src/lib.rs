//! # AppForge Core
//!
//! The "Brain" of AppForge - turns a natural-language problem statement into
//! a runnable web application through a pipeline of LLM-backed agents.
//!
//! ## Architecture
//!
//! - `agents/` - Capability interface, composition primitives, LLM-backed roles
//! - `orchestrator/` - Pipeline driver: build, refine, and self-heal loops
//! - `state/` - Per-session project state and the session table
//! - `validate` - Per-language syntax gate feeding the self-heal loop
//! - `workspace` - Export of generated projects to disk
//!
//! ## Usage
//!
//! ```rust,ignore
//! use appforge_core::orchestrator::{Orchestrator, OrchestratorConfig};
//! use appforge_core::state::{ProblemStatement, SessionManager};
//!
//! let sessions = SessionManager::new();
//! let id = sessions.create(ProblemStatement::new("a todo list app")).await;
//! let engine = Orchestrator::new(OrchestratorConfig::default());
//! let state = engine.build("a todo list app", &id, &sessions).await?;
//! ```

pub mod agents;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod state;
pub mod validate;
pub mod workspace;
