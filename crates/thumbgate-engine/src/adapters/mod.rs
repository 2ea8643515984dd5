//! Capability seams for the external models and the two generation steps
//! built on top of them.

pub mod gemini;
pub mod http;
pub mod openai;
pub mod tesseract;

#[cfg(test)]
pub(crate) mod fakes;

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use thumbgate_contracts::plan::GenerationPlan;

use crate::error::GenerationError;
use crate::{CANVAS_HEIGHT, CANVAS_WIDTH};

pub const DECOMPOSE_TEMPERATURE: f32 = 0.7;

pub const DECOMPOSE_SYSTEM_DIRECTIVE: &str = "You are an art director for video thumbnails. \
Turn the video topic into a short punchy title and one symbolic, cinematic background scene.

Background scene rules:
1. No text, letters, numbers, or words anywhere.
2. No humans, faces, hands, characters, or silhouettes.
3. No objects that naturally carry text or faces (banknotes, newspapers, screens showing code, ID cards).

Prefer grounded visual metaphors (physical objects, environments, dramatic lighting) over generic abstract shapes.
Example: topic \"Economy is Crashing\" -> \"A giant crystal bull statue shattering on a dark marble floor, high speed photography, cinematic shadows.\"

Reply with EXACTLY 3 lines.
Line 1: Title (catchy, max 5 words).
Line 2: Background prompt (detailed, metaphorical, cinematic, no humans, no text).
Line 3: Mode (exactly 'light' or 'dark', matching the visual).";

pub const BACKGROUND_NEGATIVE_CLAUSE: &str =
    "CRITICAL: Absolutely NO humans, NO people, NO faces, NO hands, NO characters. No text or words.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
}

/// Chat-style text completion (system + user message).
pub trait TextCompletion: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &CompletionRequest<'_>) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    InlineImage {
        mime_type: Option<String>,
        bytes: Vec<u8>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub parts: Vec<ContentPart>,
}

/// Decoded multimodal response: candidates, each an ordered list of parts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneratedContent {
    pub candidates: Vec<Candidate>,
}

impl GeneratedContent {
    /// Bytes of the first inline image in the first candidate.
    pub fn first_image(&self) -> Result<&[u8], GenerationError> {
        let parts = self
            .candidates
            .first()
            .map(|candidate| candidate.parts.as_slice())
            .unwrap_or_default();
        if parts.is_empty() {
            return Err(GenerationError::NoCandidates);
        }
        parts
            .iter()
            .find_map(|part| match part {
                ContentPart::InlineImage { bytes, .. } if !bytes.is_empty() => Some(bytes.as_slice()),
                _ => None,
            })
            .ok_or(GenerationError::NoImagePayload)
    }

    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .map(|candidate| {
                candidate
                    .parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text(text) => Some(text.as_str()),
                        ContentPart::InlineImage { .. } => None,
                    })
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

/// Prompt → multimodal content, expected to carry an inline image.
pub trait ImageGeneration: Send + Sync {
    fn name(&self) -> &str;
    fn generate(&self, prompt: &str) -> Result<GeneratedContent>;
}

/// Image + instruction → free-text verdict.
pub trait VisionAudit: Send + Sync {
    fn name(&self) -> &str;
    fn audit(&self, image: &RgbImage, instruction: &str) -> Result<String>;
}

/// Image → detected text lines.
pub trait TextRecognition: Send + Sync {
    fn name(&self) -> &str;
    fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>>;
}

pub struct PromptDecomposer {
    completion: Box<dyn TextCompletion>,
}

impl PromptDecomposer {
    pub fn new(completion: Box<dyn TextCompletion>) -> Self {
        Self { completion }
    }

    pub fn decompose(&self, user_prompt: &str) -> Result<GenerationPlan> {
        let raw = self
            .completion
            .complete(&CompletionRequest {
                system: DECOMPOSE_SYSTEM_DIRECTIVE,
                user: user_prompt,
                temperature: DECOMPOSE_TEMPERATURE,
            })
            .with_context(|| format!("{} decomposition request failed", self.completion.name()))?;
        Ok(GenerationPlan::from_completion(raw.trim(), user_prompt))
    }
}

pub fn background_prompt(image_prompt: &str, extra_constraint: Option<&str>) -> String {
    let mut prompt = format!(
        "Create a high-quality video thumbnail background: {image_prompt}. {BACKGROUND_NEGATIVE_CLAUSE}"
    );
    if let Some(extra) = extra_constraint.map(str::trim).filter(|value| !value.is_empty()) {
        prompt.push(' ');
        prompt.push_str(extra);
    }
    prompt
}

pub struct BackgroundSynthesizer {
    generation: Box<dyn ImageGeneration>,
}

impl BackgroundSynthesizer {
    pub fn new(generation: Box<dyn ImageGeneration>) -> Self {
        Self { generation }
    }

    pub fn synthesize(&self, image_prompt: &str, extra_constraint: Option<&str>) -> Result<RgbImage> {
        let prompt = background_prompt(image_prompt, extra_constraint);
        let content = self
            .generation
            .generate(&prompt)
            .with_context(|| format!("{} image request failed", self.generation.name()))?;
        let bytes = content.first_image()?;
        let decoded = image::load_from_memory(bytes)
            .with_context(|| format!("{} returned an undecodable image", self.generation.name()))?;
        Ok(fit_canvas(decoded))
    }
}

/// Stretches any image onto the fixed thumbnail canvas.
pub fn fit_canvas(image: DynamicImage) -> RgbImage {
    if image.width() == CANVAS_WIDTH && image.height() == CANVAS_HEIGHT {
        return image.to_rgb8();
    }
    image
        .resize_exact(CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Lanczos3)
        .to_rgb8()
}
