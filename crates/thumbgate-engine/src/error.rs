use thiserror::Error;

/// Typed failures of the capability adapters. Everything else travels as a
/// plain `anyhow` chain.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation failed: no content in response")]
    NoCandidates,
    #[error("Generation failed: no image in response (model may not support image generation)")]
    NoImagePayload,
    #[error("{provider} returned an empty completion")]
    EmptyCompletion { provider: String },
    #[error("{provider} request failed ({status}): {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
    },
    #[error("text recognizer `{program}` failed: {details}")]
    RecognizerFailed { program: String, details: String },
}

pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts.last().is_some_and(|existing| existing == trimmed) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
