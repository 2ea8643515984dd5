use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

use crate::error::{truncate_text, GenerationError};

/// Sent on every remote call so gateways never replay a cached generation.
pub const SKIP_CACHE_HEADER: &str = "X-Skip-Cache";
pub const SKIP_CACHE_VALUE: &str = "true";

const MAX_ERROR_BODY_CHARS: usize = 512;

pub fn build_client(timeout: Duration) -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(timeout)
        .build()
        .context("failed to build HTTP client")
}

pub fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        return Err(GenerationError::HttpStatus {
            provider: provider.to_string(),
            status: status.as_u16(),
            body: truncate_text(&body, MAX_ERROR_BODY_CHARS),
        }
        .into());
    }
    parse_json_body(provider, &body)
}

fn parse_json_body(provider: &str, body: &str) -> Result<Value> {
    serde_json::from_str(body).with_context(|| format!("{provider} returned invalid JSON payload"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{build_client, parse_json_body};

    #[test]
    fn invalid_json_names_the_provider() {
        let err = parse_json_body("Gemini", "<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.to_string(), "Gemini returned invalid JSON payload");
    }

    #[test]
    fn client_builds_with_timeout() {
        assert!(build_client(Duration::from_secs(5)).is_ok());
    }
}
