use std::process::Command;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};

use super::TextRecognition;
use crate::error::GenerationError;

/// Runs the `tesseract` binary against a temporary PNG.
pub struct TesseractRecognizer {
    program: String,
}

impl TesseractRecognizer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn failure(&self, details: impl Into<String>) -> GenerationError {
        GenerationError::RecognizerFailed {
            program: self.program.clone(),
            details: details.into(),
        }
    }
}

impl TextRecognition for TesseractRecognizer {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>> {
        let scratch = tempfile::Builder::new()
            .prefix("thumbgate-ocr-")
            .suffix(".png")
            .tempfile()
            .context("failed to create OCR scratch file")?;
        image
            .save_with_format(scratch.path(), ImageFormat::Png)
            .with_context(|| format!("failed to write {}", scratch.path().display()))?;

        let output = Command::new(&self.program)
            .arg(scratch.path())
            .arg("stdout")
            .output()
            .map_err(|err| self.failure(err.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self
                .failure(format!("{}: {}", output.status, stderr.trim()))
                .into());
        }
        Ok(parse_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn parse_output(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, RgbImage};

    use super::{parse_output, TesseractRecognizer};
    use crate::adapters::TextRecognition;
    use crate::error::GenerationError;

    #[test]
    fn output_keeps_non_empty_lines() {
        assert_eq!(
            parse_output("AI WINS\n\n  \n BIG \x0c\n"),
            vec!["AI WINS".to_string(), "BIG".to_string()]
        );
    }

    #[test]
    fn missing_binary_is_a_recognizer_failure() {
        let recognizer = TesseractRecognizer::new("thumbgate-no-such-tesseract");
        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let err = recognizer.recognize(&image).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerationError>(),
            Some(GenerationError::RecognizerFailed { program, .. }) if program == "thumbgate-no-such-tesseract"
        ));
    }
}
