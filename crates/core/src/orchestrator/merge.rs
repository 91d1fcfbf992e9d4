//! # Smart Merge
//!
//! Path-keyed reconciliation of freshly generated file batches into a
//! session's file set. Overwrite-by-path is deliberate last-writer-wins:
//! no conflict detection, no diffing.

use crate::state::models::GeneratedFile;
use std::collections::BTreeMap;

/// Unify separators to `/` and strip leading/trailing slashes. Idempotent:
/// paths differing only in separator style collide to the same key.
pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/").trim_matches('/').to_string()
}

/// Upsert a batch of new files into an existing set, keyed by normalized
/// path. At most one file survives per normalized path; a newer file at an
/// existing path replaces the older one, everything else is kept.
pub fn merge_files(existing: &[GeneratedFile], batch: Vec<GeneratedFile>) -> Vec<GeneratedFile> {
    let mut by_path: BTreeMap<String, GeneratedFile> = existing
        .iter()
        .map(|f| (normalize_path(&f.path), f.clone()))
        .collect();

    for file in batch {
        // Constructor already normalized, but files may have been built
        // before the path conventions applied; normalize the key regardless.
        by_path.insert(normalize_path(&file.path), file);
    }

    by_path.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str, content: &str) -> GeneratedFile {
        GeneratedFile::new(path, content, "html")
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["/index.html", "a\\b\\c.js", "//static/app.css/", "plain.py"] {
            let once = normalize_path(raw);
            assert_eq!(normalize_path(&once), once);
        }
    }

    #[test]
    fn test_separator_styles_collide() {
        assert_eq!(normalize_path("src\\app.js"), normalize_path("/src/app.js/"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = vec![file("index.html", "old")];
        let batch = vec![file("app.py", "print()"), file("index.html", "new")];

        let once = merge_files(&existing, batch.clone());
        let twice = merge_files(&once, batch);

        assert_eq!(once.len(), twice.len());
        let paths: Vec<_> = once.iter().map(|f| f.path.clone()).collect();
        let paths_twice: Vec<_> = twice.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, paths_twice);
    }

    #[test]
    fn test_last_writer_wins_keeps_count() {
        let existing = vec![file("index.html", "A"), file("app.py", "B")];
        let merged = merge_files(&existing, vec![file("/index.html", "C")]);

        assert_eq!(merged.len(), 2);
        let index = merged.iter().find(|f| f.path == "index.html").unwrap();
        assert_eq!(index.content, "C");
        assert_eq!(index.size(), 1);
    }

    #[test]
    fn test_new_path_grows_set() {
        let existing = vec![file("index.html", "A")];
        let merged = merge_files(&existing, vec![file("styles.css", "body{}")]);
        assert_eq!(merged.len(), 2);
    }
}
