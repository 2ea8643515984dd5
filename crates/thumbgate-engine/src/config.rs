use std::env;
use std::time::Duration;

use anyhow::{bail, Result};

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_AUDIT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TESSERACT: &str = "tesseract";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 120.0;

const GATEWAY_BASE_ENV: &str = "THUMBGATE_GATEWAY_BASE";
const GATEWAY_TOKEN_ENV: &str = "THUMBGATE_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeminiAuth {
    /// `?key=` query parameter, as the public Gemini API expects.
    ApiKey(String),
    /// `Authorization: Bearer`, as gateways in front of Vertex expect.
    Bearer(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextApiConfig {
    pub api_base: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_base: String,
    pub auth: GeminiAuth,
    pub image_model: String,
    pub audit_model: String,
}

/// Connection settings for the external capabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub text: TextApiConfig,
    pub gemini: GeminiConfig,
    pub tesseract_program: String,
    pub request_timeout: Duration,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolves settings through `lookup` so tests do not have to touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gateway_token = first_non_empty(&lookup, &[GATEWAY_TOKEN_ENV]);
        let Some(text_key) = gateway_token
            .clone()
            .or_else(|| first_non_empty(&lookup, &["OPENAI_API_KEY"]))
        else {
            bail!("{GATEWAY_TOKEN_ENV} or OPENAI_API_KEY not set");
        };
        let gemini_auth = match gateway_token {
            Some(token) => GeminiAuth::Bearer(token),
            None => match first_non_empty(&lookup, &["GEMINI_API_KEY", "GOOGLE_API_KEY"]) {
                Some(key) => GeminiAuth::ApiKey(key),
                None => bail!("{GATEWAY_TOKEN_ENV} or GEMINI_API_KEY or GOOGLE_API_KEY not set"),
            },
        };

        let text_base = first_non_empty(
            &lookup,
            &[GATEWAY_BASE_ENV, "OPENAI_API_BASE", "OPENAI_BASE_URL"],
        )
        .unwrap_or_else(|| DEFAULT_OPENAI_API_BASE.to_string());
        let gemini_base = first_non_empty(&lookup, &[GATEWAY_BASE_ENV, "GEMINI_API_BASE"])
            .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string());
        let timeout_s = first_non_empty(&lookup, &["THUMBGATE_REQUEST_TIMEOUT_S"])
            .and_then(|raw| raw.parse::<f64>().ok())
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_S);

        Ok(Self {
            text: TextApiConfig {
                api_base: normalize_base(&text_base),
                api_key: text_key,
                model: first_non_empty(&lookup, &["THUMBGATE_TEXT_MODEL"])
                    .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            },
            gemini: GeminiConfig {
                api_base: normalize_base(&gemini_base),
                auth: gemini_auth,
                image_model: first_non_empty(&lookup, &["THUMBGATE_IMAGE_MODEL"])
                    .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
                audit_model: first_non_empty(&lookup, &["THUMBGATE_AUDIT_MODEL"])
                    .unwrap_or_else(|| DEFAULT_AUDIT_MODEL.to_string()),
            },
            tesseract_program: first_non_empty(&lookup, &["THUMBGATE_TESSERACT"])
                .unwrap_or_else(|| DEFAULT_TESSERACT.to_string()),
            request_timeout: Duration::from_secs_f64(timeout_s),
        })
    }
}

fn first_non_empty<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    keys.iter()
        .filter_map(|key| lookup(*key))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn normalize_base(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
