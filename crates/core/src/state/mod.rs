//! Per-session project state and the process-wide session table.

pub mod models;
pub mod session;

pub use models::{
    FileList, FileSpec, GeneratedFile, ProblemStatement, ProgressStatus, ProgressStep,
    ProjectState, RequirementSpec, TechStack, ValidationResult,
};
pub use session::{SessionHandle, SessionManager};
