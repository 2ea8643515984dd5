//! Quality-gated generation loop: decompose, synthesize, composite, validate,
//! and escalate until the gate accepts or the budget runs out.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use thumbgate_contracts::checks::CheckResult;
use thumbgate_contracts::events::EventWriter;
use thumbgate_contracts::plan::GenerationPlan;
use thumbgate_contracts::policy::{
    AuditErrorPolicy, EscalationPolicy, InfraFailurePolicy, DEFAULT_MAX_ATTEMPTS,
};
use thumbgate_contracts::runs::report::now_utc_iso;
use thumbgate_contracts::runs::{write_report, Attempt, PipelineResult, RunReport};
use tracing::{info, info_span, warn};

use crate::adapters::gemini::{GeminiClient, GeminiImageSynthesizer, GeminiVisionAuditor};
use crate::adapters::openai::OpenAiChatDecomposer;
use crate::adapters::tesseract::TesseractRecognizer;
use crate::adapters::{BackgroundSynthesizer, ImageGeneration, PromptDecomposer, TextCompletion};
use crate::compositor::{default_font_candidates, Compositor};
use crate::config::EngineConfig;
use crate::error::error_chain_text;
use crate::validator::{GateInputs, QualityGate, ValidatorGate};
use crate::{CANVAS_HEIGHT, CANVAS_WIDTH};

pub const DEFAULT_OUTPUT_DIR: &str = "outputs";
pub const BACKGROUND_FILE: &str = "temp_bg.png";
pub const COMPOSITE_FILE: &str = "latest_thumbnail.png";
pub const FALLBACK_FILE: &str = "fallback_solid_color.png";
pub const REPORT_FILE: &str = "report.json";
pub const FALLBACK_COLOR: [u8; 3] = [45, 45, 55];

const MAX_REASON_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    /// Per-attempt copies of background and composite land here when set.
    pub history_dir: Option<PathBuf>,
    pub max_attempts: u32,
    pub escalation: EscalationPolicy,
    pub audit_errors: AuditErrorPolicy,
    pub infra_failures: InfraFailurePolicy,
    pub font_candidates: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            history_dir: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            escalation: EscalationPolicy::default(),
            audit_errors: AuditErrorPolicy::default(),
            infra_failures: InfraFailurePolicy::default(),
            font_candidates: default_font_candidates(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub background: PathBuf,
    pub composite: PathBuf,
    pub fallback: PathBuf,
    pub report: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            background: dir.join(BACKGROUND_FILE),
            composite: dir.join(COMPOSITE_FILE),
            fallback: dir.join(FALLBACK_FILE),
            report: dir.join(REPORT_FILE),
        }
    }
}

pub struct Pipeline {
    decomposer: PromptDecomposer,
    synthesizer: BackgroundSynthesizer,
    compositor: Compositor,
    gate: Box<dyn QualityGate>,
    config: PipelineConfig,
    paths: ArtifactPaths,
    events: EventWriter,
}

impl Pipeline {
    pub fn new(
        completion: Box<dyn TextCompletion>,
        generation: Box<dyn ImageGeneration>,
        gate: Box<dyn QualityGate>,
        config: PipelineConfig,
        events: EventWriter,
    ) -> Self {
        let compositor = Compositor::new(&config.font_candidates);
        let paths = ArtifactPaths::in_dir(&config.output_dir);
        Self {
            decomposer: PromptDecomposer::new(completion),
            synthesizer: BackgroundSynthesizer::new(generation),
            compositor,
            gate,
            config,
            paths,
            events,
        }
    }

    /// Wires the HTTP and process adapters described by `engine`.
    pub fn from_engine_config(
        engine: &EngineConfig,
        config: PipelineConfig,
        events: EventWriter,
    ) -> Result<Self> {
        let completion = OpenAiChatDecomposer::new(&engine.text, engine.request_timeout)?;
        let gemini = GeminiClient::new(&engine.gemini, engine.request_timeout)?;
        let generation = GeminiImageSynthesizer::new(gemini.clone(), &engine.gemini.image_model);
        let gate = ValidatorGate::new(
            Box::new(TesseractRecognizer::new(&engine.tesseract_program)),
            Box::new(GeminiVisionAuditor::new(gemini, &engine.gemini.audit_model)),
            config.audit_errors,
        );
        Ok(Self::new(
            Box::new(completion),
            Box::new(generation),
            Box::new(gate),
            config,
            events,
        ))
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    pub fn run(&self, prompt: &str) -> Result<RunReport> {
        let started_at = now_utc_iso();
        let budget = self.config.max_attempts.max(1);
        fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("failed to create {}", self.config.output_dir.display())
        })?;
        self.emit(
            "run_started",
            json!({
                "prompt": prompt,
                "max_attempts": budget,
                "out_dir": self.config.output_dir.to_string_lossy(),
                "font": format!("{:?}", self.compositor.font_source()),
                "font_family": self.compositor.font_family(),
            }),
        );

        let mut attempts: Vec<Attempt> = Vec::new();
        let mut terminal = None;
        for index in 1..=budget {
            let constraint = self.config.escalation.constraint_for(index as usize - 1);
            let attempt = self.run_attempt(prompt, index, constraint);
            if attempt.passed() {
                let url = attempt
                    .composite_path
                    .clone()
                    .unwrap_or_else(|| self.paths.composite.clone());
                terminal = Some(PipelineResult::success(url, index));
            } else if attempt.aborted() && self.config.infra_failures == InfraFailurePolicy::Abort {
                let message = attempt.error.clone().unwrap_or_default();
                terminal = Some(PipelineResult::adapter_error(
                    message,
                    self.materialize_fallback()?,
                ));
            }
            attempts.push(attempt);
            if terminal.is_some() {
                break;
            }
        }

        let result = match terminal {
            Some(result) => result,
            None => {
                let failure_log = attempts
                    .last()
                    .map(|attempt| attempt.failure_reasons.clone())
                    .unwrap_or_default();
                PipelineResult::constraint_violation(
                    attempts.len() as u32,
                    failure_log,
                    self.materialize_fallback()?,
                )
            }
        };

        let report = RunReport {
            run_id: self.events.run_id().to_string(),
            prompt: prompt.to_string(),
            started_at,
            finished_at: now_utc_iso(),
            result,
            attempts,
        };
        if let Err(err) = write_report(&self.paths.report, &report)
            .with_context(|| format!("failed to write {}", self.paths.report.display()))
        {
            warn!(error = %error_chain_text(&err, MAX_REASON_CHARS), "run report not saved");
        }

        let mut finished = serde_json::to_value(&report.result).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut finished {
            map.insert("report".to_string(), json!(self.paths.report.to_string_lossy()));
            map.insert(
                "image".to_string(),
                json!(report.result.image_path().to_string_lossy()),
            );
        }
        self.emit("run_finished", finished);
        info!(
            success = report.result.is_success(),
            attempts = report.attempt_count(),
            "run finished"
        );
        Ok(report)
    }

    /// Anything that goes wrong inside the attempt is recorded on the attempt.
    fn run_attempt(&self, prompt: &str, index: u32, constraint: Option<&str>) -> Attempt {
        let span = info_span!("attempt", index);
        let _entered = span.enter();
        self.emit(
            "attempt_started",
            json!({"attempt": index, "constraint": constraint}),
        );
        info!(constraint = constraint.unwrap_or("none"), "attempt started");

        let mut attempt = Attempt::started(index, constraint);
        match self.drive_attempt(prompt, &mut attempt) {
            Ok(()) if attempt.passed() => {
                info!("attempt passed");
                self.emit("attempt_passed", json!({"attempt": index}));
            }
            Ok(()) => {
                info!(reasons = ?attempt.failure_reasons, "attempt failed");
                self.emit(
                    "attempt_failed",
                    json!({"attempt": index, "reasons": attempt.failure_reasons}),
                );
            }
            Err(err) => {
                let reason = error_chain_text(&err, MAX_REASON_CHARS);
                warn!(error = %reason, "attempt aborted");
                attempt.abort(reason);
                self.emit(
                    "attempt_failed",
                    json!({
                        "attempt": index,
                        "reasons": attempt.failure_reasons,
                        "error": attempt.error,
                    }),
                );
            }
        }
        attempt
    }

    fn drive_attempt(&self, prompt: &str, attempt: &mut Attempt) -> Result<()> {
        let index = attempt.index;
        let plan = self.decomposer.decompose(prompt)?;
        info!(title = %plan.title, mode = %plan.mode, "plan decomposed");
        self.emit(
            "plan_decomposed",
            json!({
                "attempt": index,
                "title": plan.title,
                "image_prompt": plan.image_prompt,
                "mode": plan.mode,
            }),
        );
        attempt.plan = Some(plan.clone());

        let background = self
            .synthesizer
            .synthesize(&plan.image_prompt, attempt.constraint.as_deref())?;
        save_png(&background, &self.paths.background)?;
        attempt.background_path = Some(self.paths.background.clone());
        self.emit(
            "background_synthesized",
            json!({
                "attempt": index,
                "path": self.paths.background.to_string_lossy(),
            }),
        );

        let composite = self
            .compositor
            .overlay(&background, &plan.title, plan.mode)?;
        save_png(&composite, &self.paths.composite)?;
        let fingerprint = pixel_fingerprint(&composite);
        attempt.composite_path = Some(self.paths.composite.clone());
        attempt.fingerprint = Some(fingerprint.clone());
        self.emit(
            "composite_rendered",
            json!({
                "attempt": index,
                "path": self.paths.composite.to_string_lossy(),
                "fingerprint": fingerprint,
            }),
        );

        self.preserve_history(index)?;

        let checks = self.evaluate(&composite, &background, &plan)?;
        for check in &checks {
            self.emit(
                "check_completed",
                json!({
                    "attempt": index,
                    "check": check.name,
                    "passed": check.passed,
                    "metric": check.metric,
                    "detail": check.detail,
                }),
            );
            if check.audit_recovered() {
                self.emit(
                    "audit_fallback",
                    json!({"attempt": index, "detail": check.detail}),
                );
            }
        }
        attempt.record_checks(checks);
        Ok(())
    }

    fn evaluate(
        &self,
        composite: &RgbImage,
        background: &RgbImage,
        plan: &GenerationPlan,
    ) -> Result<Vec<CheckResult>> {
        self.gate.evaluate(&GateInputs {
            composite,
            background,
            plan,
        })
    }

    fn preserve_history(&self, index: u32) -> Result<()> {
        let Some(dir) = self.config.history_dir.as_ref() else {
            return Ok(());
        };
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        for (source, name) in [
            (&self.paths.background, format!("attempt_{index}_bg.png")),
            (&self.paths.composite, format!("attempt_{index}_thumb.png")),
        ] {
            let target = dir.join(name);
            fs::copy(source, &target).with_context(|| {
                format!("failed to copy {} to {}", source.display(), target.display())
            })?;
        }
        Ok(())
    }

    /// Writes the solid placeholder unless one is already on disk.
    fn materialize_fallback(&self) -> Result<PathBuf> {
        let path = &self.paths.fallback;
        if !path.exists() {
            let fallback = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, Rgb(FALLBACK_COLOR));
            save_png(&fallback, path)?;
        }
        Ok(path.clone())
    }

    /// Event log writes never fail the run.
    fn emit(&self, event_type: &str, payload: Value) {
        let payload: Map<String, Value> = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Err(err) = self
            .events
            .emit(event_type, payload)
            .with_context(|| format!("failed to append {event_type} event"))
        {
            warn!(error = %error_chain_text(&err, MAX_REASON_CHARS), "event log write failed");
        }
    }
}

fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// SHA-256 over the raw RGB bytes.
pub fn pixel_fingerprint(image: &RgbImage) -> String {
    hex::encode(Sha256::digest(image.as_raw()))
}
