//! # Validation Gate
//!
//! Cheap per-language syntax heuristics over generated files. The engine
//! never interprets these messages; it forwards `path: message` lines to the
//! self-heal prompt and leaves judgement to the caller.

use crate::state::models::{GeneratedFile, ValidationResult};
use chrono::Utc;
use regex::Regex;

/// Outcome for a single file.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    fn pass() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            passed: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Validate one file's content for its language tag. Unknown languages pass.
pub fn validate(content: &str, language: &str) -> ValidationOutcome {
    match language.to_ascii_lowercase().as_str() {
        "python" | "py" => validate_python(content),
        "javascript" | "js" | "jsx" => validate_javascript(content),
        "html" => validate_html(content),
        "css" => validate_css(content),
        _ => ValidationOutcome::pass(),
    }
}

/// Validate every file in a project and aggregate `path: message` lines.
pub fn validate_project(files: &[GeneratedFile]) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for file in files {
        let outcome = validate(&file.content, &file.language);
        errors.extend(outcome.errors.iter().map(|m| format!("{}: {}", file.path, m)));
        warnings.extend(outcome.warnings.iter().map(|m| format!("{}: {}", file.path, m)));
    }

    ValidationResult {
        passed: errors.is_empty(),
        errors,
        warnings,
        timestamp: Utc::now(),
    }
}

fn balance_errors(content: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let pairs = [
        ('{', '}', "Mismatched curly braces"),
        ('(', ')', "Mismatched parentheses"),
        ('[', ']', "Mismatched square brackets"),
    ];
    for (open, close, message) in pairs {
        let opens = content.matches(open).count();
        let closes = content.matches(close).count();
        if opens != closes {
            errors.push(message.to_string());
        }
    }
    errors
}

fn validate_python(content: &str) -> ValidationOutcome {
    let mut errors = balance_errors(content);

    // Unterminated triple-quoted strings swallow the rest of the file.
    for quote in ["\"\"\"", "'''"] {
        if content.matches(quote).count() % 2 != 0 {
            errors.push(format!("Unterminated triple-quoted string ({quote})"));
        }
    }

    ValidationOutcome::from_parts(errors, Vec::new())
}

fn validate_javascript(content: &str) -> ValidationOutcome {
    let errors = balance_errors(content);
    let mut warnings = Vec::new();

    let eval_call = Regex::new(r"\beval\s*\(").expect("static pattern");
    if eval_call.is_match(content) {
        warnings.push("Use of eval() detected - potential security risk".to_string());
    }
    let inner_html = Regex::new(r"innerHTML\s*=").expect("static pattern");
    if inner_html.is_match(content) {
        warnings.push("Direct innerHTML assignment - potential XSS risk".to_string());
    }

    ValidationOutcome::from_parts(errors, warnings)
}

fn validate_html(content: &str) -> ValidationOutcome {
    let mut errors = Vec::new();

    let doctype = Regex::new(r"(?i)<!DOCTYPE\s+html>").expect("static pattern");
    if !doctype.is_match(content) {
        errors.push("Missing DOCTYPE declaration".to_string());
    }
    let html_tag = Regex::new(r"(?i)<html[^>]*>").expect("static pattern");
    if !html_tag.is_match(content) {
        errors.push("Missing <html> tag".to_string());
    }

    // Void elements never close; everything else opened must close somewhere.
    const VOID: [&str; 6] = ["img", "br", "hr", "input", "meta", "link"];
    let opening = Regex::new(r"<(\w+)[^>]*>").expect("static pattern");
    let closing = Regex::new(r"</(\w+)>").expect("static pattern");

    let closed: Vec<String> = closing
        .captures_iter(content)
        .map(|c| c[1].to_ascii_lowercase())
        .collect();

    let mut reported: Vec<String> = Vec::new();
    for capture in opening.captures_iter(content) {
        let tag = capture[1].to_ascii_lowercase();
        if VOID.contains(&tag.as_str()) || closed.contains(&tag) || reported.contains(&tag) {
            continue;
        }
        errors.push(format!("Unclosed tag: <{tag}>"));
        reported.push(tag);
    }

    ValidationOutcome::from_parts(errors, Vec::new())
}

fn validate_css(content: &str) -> ValidationOutcome {
    let errors = if content.matches('{').count() != content.matches('}').count() {
        vec!["Mismatched curly braces in CSS".to_string()]
    } else {
        Vec::new()
    };
    ValidationOutcome::from_parts(errors, Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_language_passes() {
        assert!(validate("anything at all", "markdown").passed);
    }

    #[test]
    fn test_javascript_balance_and_warnings() {
        let outcome = validate("function f() { return eval('1'); }", "javascript");
        assert!(outcome.passed);
        assert_eq!(outcome.warnings.len(), 1);

        let outcome = validate("function f() { return 1;", "js");
        assert!(!outcome.passed);
        assert!(outcome.errors[0].contains("curly"));
    }

    #[test]
    fn test_html_requires_structure() {
        let good = "<!DOCTYPE html><html><body><p>hi</p><br></body></html>";
        assert!(validate(good, "html").passed);

        let outcome = validate("<div><span>text</span>", "html");
        assert!(!outcome.passed);
        assert!(outcome.errors.iter().any(|e| e.contains("DOCTYPE")));
        assert!(outcome.errors.iter().any(|e| e.contains("<div>")));
    }

    #[test]
    fn test_python_triple_quote() {
        let outcome = validate("x = \"\"\"open string", "python");
        assert!(!outcome.passed);
    }

    #[test]
    fn test_css_balance() {
        assert!(validate("body { color: red; }", "css").passed);
        assert!(!validate("body { color: red;", "css").passed);
    }

    #[test]
    fn test_project_aggregation_prefixes_paths() {
        let files = vec![
            GeneratedFile::new("index.html", "<div>", "html"),
            GeneratedFile::new("app.py", "print('ok')", "python"),
        ];
        let result = validate_project(&files);
        assert!(!result.passed);
        assert!(result.errors.iter().all(|e| !e.starts_with(": ")));
        assert!(result.errors.iter().any(|e| e.starts_with("index.html: ")));
    }
}
