use crate::config::MissingCredentials;
use crate::controller::ControllerError;
use crate::retry::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Credentials,
    Provider,
    Input,
    Io,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Credentials => "CREDENTIALS",
            ErrorCategory::Provider => "PROVIDER",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Io => "IO",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Credentials => {
                "Export GOOGLE_API_KEY and SERPER_API_KEY, then run adaptive-analyzer doctor."
            }
            ErrorCategory::Provider => {
                "Check your API keys and quota, or retry later with RUST_LOG=info for per-attempt logs."
            }
            ErrorCategory::Input => "Run adaptive-analyzer --help and correct command arguments.",
            ErrorCategory::Io => "Check that the output and telemetry paths exist and are writable.",
            ErrorCategory::Internal => {
                "Retry with RUST_LOG=debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    for cause in err.chain() {
        if cause.downcast_ref::<MissingCredentials>().is_some() {
            return ErrorCategory::Credentials;
        }
        if let Some(controller) = cause.downcast_ref::<ControllerError>() {
            return match controller {
                ControllerError::Aborted { source, .. } if source.kind == FailureKind::Fatal => {
                    if looks_like_credentials(&source.message) {
                        ErrorCategory::Credentials
                    } else {
                        ErrorCategory::Provider
                    }
                }
                _ => ErrorCategory::Provider,
            };
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorCategory::Io;
        }
    }

    let msg = format!("{err:#}").to_ascii_lowercase();
    if looks_like_credentials(&msg) {
        return ErrorCategory::Credentials;
    }
    if msg.contains("gemini") || msg.contains("search api") || msg.contains("http client") {
        return ErrorCategory::Provider;
    }
    if msg.contains("invalid value")
        || msg.contains("unknown argument")
        || msg.contains("failed to read input")
        || msg.contains("profile")
        || msg.contains("product name")
        || msg.contains("out of range")
        || msg.contains("not a gemini model")
    {
        return ErrorCategory::Input;
    }
    if msg.contains("failed to write") || msg.contains("failed to create") {
        return ErrorCategory::Io;
    }

    ErrorCategory::Internal
}

fn looks_like_credentials(message: &str) -> bool {
    let msg = message.to_ascii_lowercase();
    msg.contains("api key") || msg.contains("api_key") || msg.contains("unauthorized")
}

pub fn format_cli_error(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let category = categorize_error(err);
    let rendered_error = render_error_message(err, show_sensitive_config);
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        rendered_error,
        category.hint()
    )
}

pub fn render_error_message(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let text = format!("{err:#}");
    if show_sensitive_config {
        text
    } else {
        redact_sensitive_text(&text)
    }
}

pub fn redact_sensitive_text(text: &str) -> String {
    redact_query_keys(&redact_google_keys(text))
}

/// Google API keys are `AIza` followed by 35 URL-safe characters.
pub fn redact_google_keys(text: &str) -> String {
    const PREFIX: &str = "AIza";
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some(offset) = text[cursor..].find(PREFIX) {
        let start = cursor + offset;
        out.push_str(&text[cursor..start]);

        let remainder = &text[start..];
        let end = remainder
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
            .unwrap_or(remainder.len());
        if end >= 30 {
            out.push_str("[REDACTED]");
        } else {
            out.push_str(&remainder[..end]);
        }
        cursor = start + end;
    }

    out.push_str(&text[cursor..]);
    out
}

/// Redact `key=...` query parameters in URLs echoed by HTTP errors.
pub fn redact_query_keys(text: &str) -> String {
    const MARKERS: [&str; 2] = ["?key=", "&key="];
    let mut out = text.to_string();
    for marker in MARKERS {
        let mut result = String::with_capacity(out.len());
        let mut cursor = 0usize;
        while let Some(offset) = out[cursor..].find(marker) {
            let start = cursor + offset + marker.len();
            result.push_str(&out[cursor..start]);
            let end = out[start..]
                .find(|ch: char| ch == '&' || ch == ')' || ch == '"' || ch.is_whitespace())
                .map(|idx| start + idx)
                .unwrap_or(out.len());
            result.push_str("[REDACTED]");
            cursor = end;
        }
        result.push_str(&out[cursor..]);
        out = result;
    }
    out
}
