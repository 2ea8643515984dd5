//! Scripted capability implementations for engine tests.

use std::io::Cursor;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use thumbgate_contracts::checks::{CheckMetric, CheckName, CheckResult};

use super::{
    Candidate, CompletionRequest, ContentPart, GeneratedContent, ImageGeneration, TextCompletion,
    TextRecognition, VisionAudit,
};
use crate::validator::{GateInputs, QualityGate};

pub type CallLog<T> = Arc<Mutex<Vec<T>>>;

pub fn call_log<T>() -> CallLog<T> {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn logged<T: Clone>(log: &CallLog<T>) -> Vec<T> {
    log.lock().map(|calls| calls.clone()).unwrap_or_default()
}

fn record<T>(log: &Option<CallLog<T>>, value: T) {
    if let Some(log) = log {
        if let Ok(mut calls) = log.lock() {
            calls.push(value);
        }
    }
}

pub fn png_bytes(color: [u8; 3], width: u32, height: u32) -> Result<Vec<u8>> {
    encode_png(&RgbImage::from_pixel(width, height, Rgb(color)))
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub struct ScriptedCompletion {
    reply: std::result::Result<String, String>,
    log: Option<CallLog<(String, String)>>,
}

impl ScriptedCompletion {
    pub fn always(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            log: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            log: None,
        }
    }

    pub fn with_log(mut self, log: CallLog<(String, String)>) -> Self {
        self.log = Some(log);
        self
    }
}

impl TextCompletion for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted-completion"
    }

    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String> {
        record(
            &self.log,
            (request.system.to_string(), request.user.to_string()),
        );
        self.reply.clone().map_err(|message| anyhow!(message))
    }
}

pub struct ScriptedGeneration {
    content: GeneratedContent,
    log: Option<CallLog<String>>,
}

impl ScriptedGeneration {
    pub fn solid(color: [u8; 3], width: u32, height: u32) -> Self {
        Self::png(png_bytes(color, width, height).unwrap_or_default())
    }

    /// Two flat halves split at the vertical midline.
    pub fn halves(left: [u8; 3], right: [u8; 3], width: u32, height: u32) -> Self {
        let image = RgbImage::from_fn(width, height, |x, _| {
            Rgb(if x < width / 2 { left } else { right })
        });
        Self::png(encode_png(&image).unwrap_or_default())
    }

    fn png(bytes: Vec<u8>) -> Self {
        Self::content(GeneratedContent {
            candidates: vec![Candidate {
                parts: vec![ContentPart::InlineImage {
                    mime_type: Some("image/png".to_string()),
                    bytes,
                }],
            }],
        })
    }

    pub fn content(content: GeneratedContent) -> Self {
        Self { content, log: None }
    }

    pub fn with_log(mut self, log: CallLog<String>) -> Self {
        self.log = Some(log);
        self
    }
}

impl ImageGeneration for ScriptedGeneration {
    fn name(&self) -> &str {
        "scripted-generation"
    }

    fn generate(&self, prompt: &str) -> Result<GeneratedContent> {
        record(&self.log, prompt.to_string());
        Ok(self.content.clone())
    }
}

/// Answers with `preview` lines for images no wider than the mobile preview
/// and `full` lines otherwise.
pub struct ScriptedRecognizer {
    full: Vec<String>,
    preview: Vec<String>,
    log: Option<CallLog<(u32, u32)>>,
}

impl ScriptedRecognizer {
    pub fn lines(full: &[&str], preview: &[&str]) -> Self {
        Self {
            full: full.iter().map(|line| line.to_string()).collect(),
            preview: preview.iter().map(|line| line.to_string()).collect(),
            log: None,
        }
    }

    pub fn with_log(mut self, log: CallLog<(u32, u32)>) -> Self {
        self.log = Some(log);
        self
    }
}

impl TextRecognition for ScriptedRecognizer {
    fn name(&self) -> &str {
        "scripted-recognizer"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>> {
        record(&self.log, (image.width(), image.height()));
        if image.width() <= 200 {
            Ok(self.preview.clone())
        } else {
            Ok(self.full.clone())
        }
    }
}

pub struct ScriptedAuditor {
    reply: std::result::Result<String, String>,
    log: Option<CallLog<String>>,
}

impl ScriptedAuditor {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            log: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            log: None,
        }
    }

    pub fn with_log(mut self, log: CallLog<String>) -> Self {
        self.log = Some(log);
        self
    }
}

impl VisionAudit for ScriptedAuditor {
    fn name(&self) -> &str {
        "scripted-auditor"
    }

    fn audit(&self, image: &RgbImage, instruction: &str) -> Result<String> {
        let centre = image.get_pixel(image.width() / 2, image.height() / 2).0;
        record(&self.log, format!("{centre:?} {instruction}"));
        self.reply.clone().map_err(|message| anyhow!(message))
    }
}

/// Fails the listed checks on each evaluation; the last entry repeats.
pub struct ScriptedGate {
    failing: Vec<Vec<CheckName>>,
    calls: Mutex<usize>,
}

impl ScriptedGate {
    pub fn passing() -> Self {
        Self::failing_per_attempt(vec![Vec::new()])
    }

    pub fn failing_per_attempt(failing: Vec<Vec<CheckName>>) -> Self {
        Self {
            failing,
            calls: Mutex::new(0),
        }
    }
}

impl QualityGate for ScriptedGate {
    fn evaluate(&self, _inputs: &GateInputs<'_>) -> Result<Vec<CheckResult>> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| anyhow!("scripted gate lock poisoned"))?;
        let idx = (*calls).min(self.failing.len().saturating_sub(1));
        *calls += 1;
        let failing = self.failing.get(idx).cloned().unwrap_or_default();
        Ok(CheckName::ALL
            .iter()
            .map(|name| {
                let passed = !failing.contains(name);
                CheckResult::new(
                    *name,
                    passed,
                    CheckMetric::Number(if passed { 1.0 } else { 0.0 }),
                    "scripted",
                )
            })
            .collect())
    }
}
