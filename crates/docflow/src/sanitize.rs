//! Helpers for sanitizing data before it enters log lines and span fields.
//!
//! OCR engines echo their input and configuration on stderr, and cloud APIs
//! echo request details in error bodies. Nothing that reaches tracing output
//! should carry credentials or full storage paths.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

/// Longest diagnostic string kept in logs and error messages.
pub const MAX_DIAGNOSTIC_LEN: usize = 512;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Same as [`redact_path`] for storage keys, which are `/`-separated strings.
pub fn redact_storage_key(key: &str) -> String {
    redact_path(Path::new(key))
}

fn secret_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)(password|token|key|secret|authorization)(\s*[=:]\s*)[^\s&]+")
                .expect("static regex"),
            Regex::new(r"Bearer\s+[a-zA-Z0-9\-._~=+/]+").expect("static regex"),
        ]
    })
}

/// Masks credential assignments (`key=...`, `token: ...`) and bearer tokens.
pub fn mask_secrets(text: &str) -> String {
    let [assignment, bearer] = secret_patterns();
    let masked = assignment.replace_all(text, "$1$2****");
    bearer.replace_all(&masked, "Bearer ****").into_owned()
}

/// Masks secrets and truncates to [`MAX_DIAGNOSTIC_LEN`] characters.
pub fn diagnostic(text: &str) -> String {
    let masked = mask_secrets(text.trim());
    if masked.chars().count() <= MAX_DIAGNOSTIC_LEN {
        return masked;
    }
    let mut truncated: String = masked.chars().take(MAX_DIAGNOSTIC_LEN).collect();
    truncated.push_str("...");
    truncated
}
