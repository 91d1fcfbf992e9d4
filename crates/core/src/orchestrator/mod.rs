//! # Orchestration
//!
//! Pipeline construction and the engine driving build, refine, and
//! self-heal calls against a session.
//!
//! ## Pipeline shapes
//!
//! ```text
//! build:  Planner -> [ FrontendCoder || BackendCoder ]
//! refine:            [ FrontendCoder || BackendCoder ]
//! ```

pub mod engine;
pub mod events;
pub mod merge;

pub use engine::{Orchestrator, OrchestratorConfig};
pub use events::{BuildEvent, BuildEventKind};
pub use merge::{merge_files, normalize_path};
