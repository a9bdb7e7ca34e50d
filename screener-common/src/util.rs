//! Utility functions for the screener service.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Works on character boundaries, so CJK text and emoji are never split.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Sanitize a string for safe logging (redact sensitive patterns).
pub fn sanitize_for_log(s: &str) -> String {
    let patterns: &[(&str, &str)] = &[
        (r"(?i)(api[_-]?key|apikey)[=:]\s*\S{8,}", "$1=***REDACTED***"),
        (r"(?i)(token|secret|bearer)\s*[=:]?\s*[A-Za-z0-9._-]{10,}", "$1 ***REDACTED***"),
        (r"sk-[a-zA-Z0-9_-]{16,}", "***REDACTED_API_KEY***"),
    ];

    let mut result = s.to_string();
    for (pattern, replacement) in patterns {
        if let Ok(re) = regex::Regex::new(pattern) {
            result = re.replace_all(&result, *replacement).to_string();
        }
    }
    result
}

/// Mask a secret for display, keeping only the last four characters.
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count == 0 {
        return String::new();
    }
    if count <= 4 {
        return "*".repeat(count);
    }
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("****{tail}")
}
