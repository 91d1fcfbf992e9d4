//! # Workspace Export
//!
//! Writes a session's generated files under the output directory and keeps
//! the directory from growing without bound.

use crate::error::EngineResult;
use crate::state::models::GeneratedFile;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// Strip leading slashes and drive letters so a generated path can never
/// escape the project directory.
pub fn sanitize_relative(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = match path.rsplit_once(':') {
        Some((_, rest)) => rest,
        None => path.as_str(),
    };
    path.trim_start_matches('/').to_string()
}

/// Write generated files under `project_dir`, creating parents as needed.
pub async fn write_project(files: &[GeneratedFile], project_dir: &Path) -> EngineResult<PathBuf> {
    fs::create_dir_all(project_dir).await?;

    for file in files {
        let relative = sanitize_relative(&file.path);
        if relative.is_empty() {
            tracing::warn!(path = %file.path, "skipping file with empty sanitized path");
            continue;
        }
        let target = project_dir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&target, &file.content).await?;
    }

    Ok(project_dir.to_path_buf())
}

/// Relative paths of every file under an exported project directory.
pub fn project_tree(project_dir: &Path) -> Vec<String> {
    WalkDir::new(project_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(project_dir)
                .ok()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
        })
        .collect()
}

/// Remove exported projects beyond the `keep_recent` most recently modified.
pub async fn cleanup_old_projects(output_dir: &Path, keep_recent: usize) -> EngineResult<()> {
    if !output_dir.exists() {
        return Ok(());
    }

    let mut projects: Vec<(std::time::SystemTime, PathBuf)> = Vec::new();
    let mut entries = fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_dir() {
            let modified = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
            projects.push((modified, entry.path()));
        }
    }

    projects.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in projects.into_iter().skip(keep_recent) {
        if let Err(err) = fs::remove_dir_all(&path).await {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove old project");
        }
    }

    Ok(())
}
