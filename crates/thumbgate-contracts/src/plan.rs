use std::fmt;

use serde::{Deserialize, Serialize};

pub const MAX_TITLE_WORDS: usize = 5;
pub const FALLBACK_TITLE_CHARS: usize = 40;
pub const MIN_IMAGE_PROMPT_CHARS: usize = 15;

const TITLE_LABEL: &str = "Title: ";
const EMPTY_PROMPT_TITLE: &str = "Untitled";

/// Overlay mode picked by the decomposition step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Light,
    #[default]
    Dark,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    /// Exact keyword match after lower-casing and trimming surrounding dots.
    pub fn parse_keyword(raw: &str) -> Option<Self> {
        match raw.to_lowercase().trim_matches('.') {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub fn coerce(raw: Option<&str>) -> Self {
        raw.and_then(Self::parse_keyword).unwrap_or_default()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPlan {
    pub title: String,
    pub image_prompt: String,
    pub mode: Mode,
}

impl GenerationPlan {
    /// Builds a plan from the raw three-line completion, repairing whatever the
    /// model got wrong. The result always satisfies the plan invariants.
    pub fn from_completion(raw: &str, user_prompt: &str) -> Self {
        let lines: Vec<&str> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        Self {
            title: parse_title(lines.first().copied(), user_prompt),
            image_prompt: parse_image_prompt(lines.get(1).copied(), user_prompt),
            mode: Mode::coerce(lines.get(2).copied()),
        }
    }
}

fn parse_title(line: Option<&str>, user_prompt: &str) -> String {
    let candidate = line
        .map(|value| value.replace(TITLE_LABEL, "").trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| user_prompt.to_string());

    let words: Vec<&str> = candidate.split_whitespace().take(MAX_TITLE_WORDS).collect();
    if !words.is_empty() {
        return words.join(" ");
    }

    let truncated: String = user_prompt.chars().take(FALLBACK_TITLE_CHARS).collect();
    let truncated = truncated.trim();
    if truncated.is_empty() {
        EMPTY_PROMPT_TITLE.to_string()
    } else {
        truncated.to_string()
    }
}

fn parse_image_prompt(line: Option<&str>, user_prompt: &str) -> String {
    match line {
        Some(value) if !is_degenerate_image_prompt(value) => value.to_string(),
        _ if user_prompt.trim().is_empty() => EMPTY_PROMPT_TITLE.to_string(),
        _ => user_prompt.to_string(),
    }
}

/// Too short to draw from, or the model echoed the mode keyword into the
/// description slot.
fn is_degenerate_image_prompt(value: &str) -> bool {
    if value.chars().count() < MIN_IMAGE_PROMPT_CHARS {
        return true;
    }
    matches!(
        value.to_lowercase().trim_end_matches('.'),
        "dark" | "light"
    )
}
