//! # Project State
//!
//! One mutable record per build session: the problem statement, the planned
//! requirements, the generated file set, the latest validation outcome, the
//! progress log, and the persisted agent context snapshot.

use crate::agents::context::ContextSnapshot;
use chrono::{DateTime, Utc};
use radkit::macros::LLMOutput;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Status of a progress step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

/// A named step in the orchestration progress log. Step names act as keys:
/// re-reporting a name updates the entry in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressStep {
    pub name: String,
    pub status: ProgressStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Option<String>,
}

/// The user's original request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemStatement {
    pub description: String,
    #[serde(default)]
    pub tech_preferences: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProblemStatement {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            tech_preferences: None,
            timestamp: Utc::now(),
        }
    }
}

/// Technical stack selection produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq, Eq)]
pub struct TechStack {
    pub frontend: String,
    pub backend: String,
    pub database: String,
}

/// Structured requirements produced once by the plan stage and read-only
/// afterwards: refinement and self-heal never touch this.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput, PartialEq, Eq)]
pub struct RequirementSpec {
    pub functional_components: Vec<String>,
    pub tech_stack: TechStack,
    #[serde(default)]
    pub clarifications: Vec<String>,
    pub complexity: String,
}

/// Wire shape of one file as produced by a coder capability.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct FileSpec {
    pub path: String,
    pub content: String,
    pub language: String,
}

/// Structured output of a coder capability: a batch of files.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, LLMOutput)]
pub struct FileList {
    pub files: Vec<FileSpec>,
}

/// A generated file held in project state. `size` is derived from the content
/// at construction and never settable independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
    pub language: String,
    size: usize,
}

impl GeneratedFile {
    /// Build a file with a normalized path and a computed size.
    pub fn new(path: impl Into<String>, content: impl Into<String>, language: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            path: crate::orchestrator::merge::normalize_path(&path.into()),
            size: content.len(),
            content,
            language: language.into(),
        }
    }

    pub fn from_spec(spec: FileSpec) -> Self {
        Self::new(spec.path, spec.content, spec.language)
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Outcome of the most recent validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub passed: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Complete state of a generated project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_id: String,
    pub problem_statement: ProblemStatement,
    #[serde(default)]
    pub requirements: Option<RequirementSpec>,
    #[serde(default)]
    pub files: Vec<GeneratedFile>,
    #[serde(default)]
    pub validation: Option<ValidationResult>,
    #[serde(default)]
    pub progress_log: Vec<ProgressStep>,
    /// Agent runtime snapshot persisted at the end of every orchestration
    /// call and rehydrated at the start of the next.
    #[serde(default)]
    pub agent_context: Option<ContextSnapshot>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectState {
    pub fn new(project_id: impl Into<String>, problem_statement: ProblemStatement) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            problem_statement,
            requirements: None,
            files: Vec::new(),
            validation: None,
            progress_log: Vec::new(),
            agent_context: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update a progress step in place, or append it if the name is new.
    pub fn update_progress(&mut self, name: &str, status: ProgressStatus, details: Option<&str>) {
        self.updated_at = Utc::now();
        if let Some(step) = self.progress_log.iter_mut().find(|s| s.name == name) {
            step.status = status;
            step.timestamp = Utc::now();
            if let Some(details) = details {
                step.details = Some(details.to_string());
            }
            return;
        }
        self.progress_log.push(ProgressStep {
            name: name.to_string(),
            status,
            timestamp: Utc::now(),
            details: details.map(str::to_string),
        });
    }

    /// Normalized paths of all generated files.
    pub fn file_paths(&self) -> Vec<String> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    /// Bump the modification timestamp after a direct mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
