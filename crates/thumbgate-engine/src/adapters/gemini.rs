use std::io::Cursor;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{ImageFormat, RgbImage};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};
use tracing::debug;

use super::http::{build_client, response_json_or_error, SKIP_CACHE_HEADER, SKIP_CACHE_VALUE};
use super::{Candidate, ContentPart, GeneratedContent, ImageGeneration, VisionAudit};
use crate::config::{GeminiAuth, GeminiConfig};

const PROVIDER: &str = "Gemini";

/// Shared `generateContent` transport for the image and audit models.
#[derive(Clone)]
pub struct GeminiClient {
    api_base: String,
    auth: GeminiAuth,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            api_base: config.api_base.clone(),
            auth: config.auth.clone(),
            http: build_client(timeout)?,
        })
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    pub fn generate_content(&self, model: &str, payload: &Value) -> Result<GeneratedContent> {
        let endpoint = self.endpoint_for_model(model);
        debug!(%model, %endpoint, "generateContent request");
        let request = self
            .http
            .post(&endpoint)
            .header(SKIP_CACHE_HEADER, SKIP_CACHE_VALUE)
            .json(payload);
        let request = match &self.auth {
            GeminiAuth::ApiKey(key) => request.query(&[("key", key.as_str())]),
            GeminiAuth::Bearer(token) => request.bearer_auth(token),
        };
        let response = request
            .send()
            .with_context(|| format!("{PROVIDER} request failed ({endpoint})"))?;
        let parsed = response_json_or_error(PROVIDER, response)?;
        parse_generated_content(&parsed)
    }
}

fn parse_generated_content(payload: &Value) -> Result<GeneratedContent> {
    let rows = payload
        .get("candidates")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut candidates = Vec::with_capacity(rows.len());

    for row in rows {
        let raw_parts = row
            .get("content")
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut parts = Vec::with_capacity(raw_parts.len());
        for part in raw_parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                parts.push(ContentPart::Text(text.to_string()));
                continue;
            }
            let Some(inline) = part
                .get("inlineData")
                .or_else(|| part.get("inline_data"))
                .and_then(Value::as_object)
            else {
                continue;
            };
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let bytes = BASE64
                .decode(data.as_bytes())
                .context("Gemini image base64 decode failed")?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .map(str::to_string);
            parts.push(ContentPart::InlineImage { mime_type, bytes });
        }
        candidates.push(Candidate { parts });
    }

    Ok(GeneratedContent { candidates })
}

fn image_generation_payload(prompt: &str) -> Value {
    json!({
        "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        "generationConfig": {"responseModalities": ["IMAGE"]},
    })
}

fn audit_payload(png: &[u8], instruction: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [
                {"inlineData": {"mimeType": "image/png", "data": BASE64.encode(png)}},
                {"text": instruction},
            ],
        }],
    })
}

pub struct GeminiImageSynthesizer {
    client: GeminiClient,
    model: String,
}

impl GeminiImageSynthesizer {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl ImageGeneration for GeminiImageSynthesizer {
    fn name(&self) -> &str {
        "gemini-image"
    }

    fn generate(&self, prompt: &str) -> Result<GeneratedContent> {
        self.client
            .generate_content(&self.model, &image_generation_payload(prompt))
    }
}

pub struct GeminiVisionAuditor {
    client: GeminiClient,
    model: String,
}

impl GeminiVisionAuditor {
    pub fn new(client: GeminiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

impl VisionAudit for GeminiVisionAuditor {
    fn name(&self) -> &str {
        "gemini-audit"
    }

    fn audit(&self, image: &RgbImage, instruction: &str) -> Result<String> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("failed to encode audit image")?;
        let content = self
            .client
            .generate_content(&self.model, &audit_payload(&png, instruction))?;
        let text = content.text();
        if text.trim().is_empty() {
            bail!("{PROVIDER} audit response contained no text");
        }
        Ok(text)
    }
}
