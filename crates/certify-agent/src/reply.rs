use certify_core::types::Analysis;

/// Remove a markdown code fence wrapper (```` ```json ... ``` ````) if present.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`, `JSON`, ...) up to the end of the line.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric()),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse the analysis reply after stripping any fence.
pub fn parse_analysis(raw: &str) -> Result<Analysis, serde_json::Error> {
    serde_json::from_str(strip_code_fence(raw))
}

/// First `max` characters, for error messages and logs.
pub fn excerpt(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((i, _)) => format!("{}...", &s[..i]),
        None => s.to_string(),
    }
}
