//! The four quality checks an attempt must clear.

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, RgbImage};
use similar::TextDiff;
use thumbgate_contracts::checks::{CheckMetric, CheckName, CheckResult, AUDIT_FALLBACK_METRIC};
use thumbgate_contracts::plan::GenerationPlan;
use thumbgate_contracts::policy::AuditErrorPolicy;
use tracing::{info, warn};

use crate::adapters::{TextRecognition, VisionAudit};
use crate::error::error_chain_text;

pub const BINARIZE_THRESHOLD: u8 = 200;
pub const MIN_FIDELITY_RATIO: f64 = 0.5;
pub const MOBILE_PREVIEW_WIDTH: u32 = 200;
pub const MOBILE_PREVIEW_HEIGHT: u32 = 112;
pub const MIN_MOBILE_RATIO: f64 = 0.6;
pub const MIN_RMS_CONTRAST: f64 = 0.15;

pub const AUDIT_INSTRUCTION: &str = "You are a strict QA auditor for background images. \
Inspect this image. Does it contain ANY of the following: \
1. Human faces or body parts (hands, limbs) \
2. Recognizable text, letters, watermarks, or symbols \
3. Obviously broken geometry or mutated objects. \
If it contains ANY of these, reply with 'FAIL'. \
If it is a clean, abstract, artifact-free background, reply with 'PASS'.";

const AUDIT_ERROR_METRIC: &str = "API_ERROR";
const MAX_AUDIT_ERROR_CHARS: usize = 300;

/// What the gate looks at for one attempt.
#[derive(Debug, Clone, Copy)]
pub struct GateInputs<'a> {
    pub composite: &'a RgbImage,
    /// Pre-overlay background; the integrity audit must not see the title.
    pub background: &'a RgbImage,
    pub plan: &'a GenerationPlan,
}

pub trait QualityGate: Send + Sync {
    /// One result per [`CheckName`]. Errors abort the attempt.
    fn evaluate(&self, inputs: &GateInputs<'_>) -> Result<Vec<CheckResult>>;
}

pub struct ValidatorGate {
    recognizer: Box<dyn TextRecognition>,
    auditor: Box<dyn VisionAudit>,
    audit_errors: AuditErrorPolicy,
}

impl ValidatorGate {
    pub fn new(
        recognizer: Box<dyn TextRecognition>,
        auditor: Box<dyn VisionAudit>,
        audit_errors: AuditErrorPolicy,
    ) -> Self {
        Self {
            recognizer,
            auditor,
            audit_errors,
        }
    }

    pub fn text_fidelity(&self, composite: &RgbImage, expected: &str) -> Result<CheckResult> {
        let mask = binarize(composite, BINARIZE_THRESHOLD);
        let detected = self.detect(&DynamicImage::ImageLuma8(mask))?;
        let ratio = similarity_ratio(&expected.to_lowercase(), &detected);
        let passed = ratio > MIN_FIDELITY_RATIO;
        info!(
            expected,
            detected = %detected,
            ratio,
            passed,
            "text fidelity"
        );
        Ok(CheckResult::new(
            CheckName::TextFidelity,
            passed,
            CheckMetric::Number(ratio),
            format!("detected {detected:?}, need > {MIN_FIDELITY_RATIO}"),
        ))
    }

    pub fn mobile_readability(&self, composite: &RgbImage, expected: &str) -> Result<CheckResult> {
        let preview = DynamicImage::ImageRgb8(composite.clone()).resize_exact(
            MOBILE_PREVIEW_WIDTH,
            MOBILE_PREVIEW_HEIGHT,
            FilterType::CatmullRom,
        );
        let detected = self.detect(&preview)?;
        let ratio = similarity_ratio(&expected.to_lowercase(), &detected);
        let passed = ratio > MIN_MOBILE_RATIO;
        info!(
            expected,
            detected = %detected,
            ratio,
            passed,
            "mobile readability"
        );
        Ok(CheckResult::new(
            CheckName::MobileReadability,
            passed,
            CheckMetric::Number(ratio),
            format!("detected {detected:?} at {MOBILE_PREVIEW_WIDTH}px, need > {MIN_MOBILE_RATIO}"),
        ))
    }

    /// Never fails: audit errors are resolved by the configured policy.
    pub fn visual_integrity(&self, background: &RgbImage) -> CheckResult {
        match self.auditor.audit(background, AUDIT_INSTRUCTION) {
            Ok(reply) => {
                let verdict = reply.trim().to_uppercase();
                let passed = verdict.contains("PASS");
                info!(verdict = %verdict, passed, "visual integrity");
                CheckResult::new(
                    CheckName::VisualIntegrity,
                    passed,
                    CheckMetric::Text(verdict),
                    format!("{} audit", self.auditor.name()),
                )
            }
            Err(err) => {
                let details = error_chain_text(&err, MAX_AUDIT_ERROR_CHARS);
                warn!(auditor = self.auditor.name(), error = %details, policy = ?self.audit_errors, "vision audit failed");
                match self.audit_errors {
                    AuditErrorPolicy::Pass => CheckResult::new(
                        CheckName::VisualIntegrity,
                        true,
                        CheckMetric::Text(AUDIT_FALLBACK_METRIC.to_string()),
                        details,
                    ),
                    AuditErrorPolicy::Fail => CheckResult::new(
                        CheckName::VisualIntegrity,
                        false,
                        CheckMetric::Text(AUDIT_ERROR_METRIC.to_string()),
                        details,
                    ),
                }
            }
        }
    }

    fn detect(&self, image: &DynamicImage) -> Result<String> {
        let lines = self
            .recognizer
            .recognize(image)
            .with_context(|| format!("{} text recognition failed", self.recognizer.name()))?;
        Ok(lines.join(" ").to_lowercase())
    }
}

impl QualityGate for ValidatorGate {
    fn evaluate(&self, inputs: &GateInputs<'_>) -> Result<Vec<CheckResult>> {
        let title = inputs.plan.title.as_str();
        Ok(vec![
            self.text_fidelity(inputs.composite, title)?,
            self.mobile_readability(inputs.composite, title)?,
            contrast(inputs.composite),
            self.visual_integrity(inputs.background),
        ])
    }
}

pub fn contrast(composite: &RgbImage) -> CheckResult {
    let rms = rms_contrast(&DynamicImage::ImageRgb8(composite.clone()).to_luma8());
    let passed = rms > MIN_RMS_CONTRAST;
    info!(rms, passed, "rms contrast");
    CheckResult::new(
        CheckName::Contrast,
        passed,
        CheckMetric::Number(rms),
        format!("need > {MIN_RMS_CONTRAST}"),
    )
}

/// Below `threshold` → black, otherwise white.
pub fn binarize(image: &RgbImage, threshold: u8) -> GrayImage {
    let mut gray = DynamicImage::ImageRgb8(image.clone()).to_luma8();
    for pixel in gray.pixels_mut() {
        *pixel = Luma([if pixel[0] < threshold { 0 } else { u8::MAX }]);
    }
    gray
}

/// Population standard deviation of intensities normalized to [0, 1].
pub fn rms_contrast(gray: &GrayImage) -> f64 {
    let count = gray.pixels().len();
    if count == 0 {
        return 0.0;
    }
    let n = count as f64;
    let mean = gray.pixels().map(|p| f64::from(p[0]) / 255.0).sum::<f64>() / n;
    let variance = gray
        .pixels()
        .map(|p| {
            let delta = f64::from(p[0]) / 255.0 - mean;
            delta * delta
        })
        .sum::<f64>()
        / n;
    variance.sqrt()
}

/// `2·M / (|a| + |b|)` over characters; two empty strings are identical.
/// `M` comes from a Myers diff, so this approximates a longest-block
/// `SequenceMatcher` ratio and can read lower on reordered OCR output.
pub fn similarity_ratio(expected: &str, detected: &str) -> f64 {
    if expected.is_empty() && detected.is_empty() {
        return 1.0;
    }
    f64::from(TextDiff::from_chars(expected, detected).ratio())
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};
    use thumbgate_contracts::checks::{CheckMetric, CheckName, AUDIT_FALLBACK_METRIC};
    use thumbgate_contracts::plan::{GenerationPlan, Mode};
    use thumbgate_contracts::policy::AuditErrorPolicy;

    use super::{
        binarize, contrast, rms_contrast, similarity_ratio, GateInputs, QualityGate, ValidatorGate,
        AUDIT_INSTRUCTION,
    };
    use crate::adapters::fakes::{call_log, logged, ScriptedAuditor, ScriptedRecognizer};

    fn checkerboard() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    fn gate(full: &[&str], preview: &[&str], auditor: ScriptedAuditor) -> ValidatorGate {
        ValidatorGate::new(
            Box::new(ScriptedRecognizer::lines(full, preview)),
            Box::new(auditor),
            AuditErrorPolicy::Pass,
        )
    }

    #[test]
    fn similarity_matches_sequence_ratio() {
        assert_eq!(similarity_ratio("ai wins", "ai wins"), 1.0);
        assert_eq!(similarity_ratio("ai wins", ""), 0.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
        let partial = similarity_ratio("abcd", "abxd");
        assert!((partial - 0.75).abs() < 1e-6);
    }

    #[test]
    fn contrast_separates_flat_and_busy_images() {
        let flat = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let flat_check = contrast(&flat);
        assert!(!flat_check.passed);
        match flat_check.metric {
            CheckMetric::Number(value) => assert!(value < 1e-9),
            CheckMetric::Text(_) => panic!("expected numeric metric"),
        }

        let busy = contrast(&checkerboard());
        assert!(busy.passed);
        match busy.metric {
            CheckMetric::Number(value) => assert!((value - 0.5).abs() < 1e-9),
            CheckMetric::Text(_) => panic!("expected numeric metric"),
        }
    }

    #[test]
    fn binarize_thresholds_at_two_hundred() {
        let image = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([199, 199, 199]),
            1 => Rgb([200, 200, 200]),
            _ => Rgb([255, 255, 255]),
        });
        let mask = binarize(&image, 200);
        assert_eq!(mask.as_raw(), &vec![0, 255, 255]);
        assert!(rms_contrast(&mask) > 0.4);
    }

    #[test]
    fn fidelity_and_mobile_use_their_own_thresholds() -> anyhow::Result<()> {
        let sizes = call_log();
        let gate = ValidatorGate::new(
            Box::new(ScriptedRecognizer::lines(&["AI", "WINS"], &["AI WIN"]).with_log(sizes.clone())),
            Box::new(ScriptedAuditor::replying("PASS")),
            AuditErrorPolicy::Pass,
        );
        let composite = RgbImage::from_pixel(1280, 720, Rgb([0, 0, 0]));

        let fidelity = gate.text_fidelity(&composite, "AI Wins")?;
        assert!(fidelity.passed);
        assert_eq!(fidelity.metric, CheckMetric::Number(1.0));

        let mobile = gate.mobile_readability(&composite, "AI Wins")?;
        assert!(mobile.passed);
        assert_eq!(logged(&sizes), vec![(1280, 720), (200, 112)]);

        let blurry = gate_with_preview(&["A1"]);
        assert!(!blurry.mobile_readability(&composite, "AI Wins")?.passed);
        Ok(())
    }

    fn gate_with_preview(preview: &[&str]) -> ValidatorGate {
        gate(&["AI WINS"], preview, ScriptedAuditor::replying("PASS"))
    }

    #[test]
    fn audit_reply_is_normalized() {
        let audits = call_log();
        let gate = gate(
            &[],
            &[],
            ScriptedAuditor::replying("  pass, looks clean \n").with_log(audits.clone()),
        );
        let background = RgbImage::from_pixel(1280, 720, Rgb([7, 8, 9]));
        let check = gate.visual_integrity(&background);
        assert!(check.passed);
        assert_eq!(check.metric, CheckMetric::Text("PASS, LOOKS CLEAN".to_string()));
        let calls = logged(&audits);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("[7, 8, 9]"));
        assert!(calls[0].ends_with(AUDIT_INSTRUCTION));

        let failing = gate_with_auditor(ScriptedAuditor::replying("FAIL: a face is visible"));
        assert!(!failing.visual_integrity(&background).passed);
    }

    fn gate_with_auditor(auditor: ScriptedAuditor) -> ValidatorGate {
        gate(&[], &[], auditor)
    }

    #[test]
    fn audit_errors_follow_policy() {
        let background = RgbImage::new(16, 16);

        let lenient = gate_with_auditor(ScriptedAuditor::failing("503 upstream"));
        let check = lenient.visual_integrity(&background);
        assert!(check.passed);
        assert!(check.audit_recovered());
        assert_eq!(check.metric, CheckMetric::Text(AUDIT_FALLBACK_METRIC.to_string()));
        assert!(check.detail.contains("503 upstream"));

        let strict = ValidatorGate::new(
            Box::new(ScriptedRecognizer::lines(&[], &[])),
            Box::new(ScriptedAuditor::failing("503 upstream")),
            AuditErrorPolicy::Fail,
        );
        let check = strict.visual_integrity(&background);
        assert!(!check.passed);
        assert!(!check.audit_recovered());
    }

    #[test]
    fn evaluate_reports_every_check_in_gate_order() -> anyhow::Result<()> {
        let gate = gate(&["AI WINS"], &["AI WINS"], ScriptedAuditor::replying("PASS"));
        let composite = checkerboard();
        let background = checkerboard();
        let plan = GenerationPlan {
            title: "AI Wins".to_string(),
            image_prompt: "A chrome trophy on a marble floor".to_string(),
            mode: Mode::Dark,
        };
        let checks = gate.evaluate(&GateInputs {
            composite: &composite,
            background: &background,
            plan: &plan,
        })?;
        let names: Vec<CheckName> = checks.iter().map(|check| check.name).collect();
        assert_eq!(names, CheckName::ALL.to_vec());
        assert!(checks.iter().all(|check| check.passed));
        Ok(())
    }
}
