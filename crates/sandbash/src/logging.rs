//! Host-side logging helpers
//!
//! Scripts routinely carry secrets (tokens in env assignments, credentials
//! in URLs), so anything the host prints about a script goes through the
//! redaction policy here rather than straight to a log sink.

use std::borrow::Cow;

/// Policy for what the host may reveal about a script when reporting on it.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether to include script content in diagnostics (default: false)
    pub log_script_content: bool,

    /// Maximum length of logged values before truncation (default: 200)
    pub max_value_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_script_content: false,
            max_value_length: 200,
        }
    }
}

impl LogConfig {
    /// Create a new log configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable logging of script content.
    ///
    /// # Warning
    ///
    /// Scripts may contain embedded secrets or credentials. Only enable in
    /// trusted debugging environments.
    pub fn unsafe_log_scripts(mut self) -> Self {
        self.log_script_content = true;
        self
    }

    /// Set maximum length for logged values
    pub fn max_value_length(mut self, len: usize) -> Self {
        self.max_value_length = len;
        self
    }

    /// Truncate value if it exceeds max length, respecting char boundaries.
    fn truncate<'a>(&self, value: &'a str) -> Cow<'a, str> {
        if value.len() <= self.max_value_length {
            Cow::Borrowed(value)
        } else {
            let mut end = self.max_value_length;
            while end > 0 && !value.is_char_boundary(end) {
                end -= 1;
            }
            Cow::Owned(format!(
                "{}...[truncated {} bytes]",
                &value[..end],
                value.len() - end
            ))
        }
    }
}

/// Escape control characters so a logged script cannot forge log lines.
pub fn sanitize_for_log(input: &str) -> String {
    input
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .chars()
        .filter(|c| !c.is_control() || *c == ' ')
        .collect()
}

/// Format a script for a diagnostic line under the given policy.
///
/// By default only the shape of the script is revealed.
pub fn format_script_for_log(script: &str, config: &LogConfig) -> String {
    if !config.log_script_content {
        let lines = script.lines().count();
        let bytes = script.len();
        return format!("[script: {} lines, {} bytes]", lines, bytes);
    }

    let sanitized = sanitize_for_log(script);
    config.truncate(&sanitized).into_owned()
}
