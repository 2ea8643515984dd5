use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::attempt::Attempt;
use super::result::PipelineResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub prompt: String,
    pub started_at: String,
    pub finished_at: String,
    pub result: PipelineResult,
    pub attempts: Vec<Attempt>,
}

impl RunReport {
    pub fn new_run_id() -> String {
        format!("run-{}", Uuid::new_v4().simple())
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }
}

pub fn write_report(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(report)? {
        Value::Object(map) => map,
        _ => anyhow::bail!("run report did not serialize to an object"),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use crate::plan::{GenerationPlan, Mode};
    use crate::runs::attempt::Attempt;
    use crate::runs::result::PipelineResult;

    use super::{write_report, RunReport};

    #[test]
    fn write_report_generates_expected_payload() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("out").join("report.json");

        let mut attempt = Attempt::started(1, None);
        attempt.plan = Some(GenerationPlan {
            title: "AI Wins".to_string(),
            image_prompt: "A chrome trophy on a dark marble floor".to_string(),
            mode: Mode::Dark,
        });
        attempt.abort("Gemini returned no candidates".to_string());
        let report = RunReport {
            run_id: "run-123".to_string(),
            prompt: "AI Wins".to_string(),
            started_at: "2026-02-19T00:00:00+00:00".to_string(),
            finished_at: "2026-02-19T00:01:00+00:00".to_string(),
            result: PipelineResult::adapter_error(
                "Gemini returned no candidates".to_string(),
                "out/fallback_solid_color.png",
            ),
            attempts: vec![attempt],
        };
        write_report(&path, &report)?;

        let parsed: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(parsed["run_id"], json!("run-123"));
        assert_eq!(parsed["result"]["status"], json!("failed"));
        assert_eq!(parsed["attempts"][0]["plan"]["mode"], json!("dark"));
        assert_eq!(parsed["attempts"][0]["outcome"], json!("fail"));
        assert!(parsed.get("ts").and_then(Value::as_str).is_some());

        let reloaded: RunReport = serde_json::from_value(parsed)?;
        assert_eq!(reloaded.attempt_count(), 1);
        Ok(())
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunReport::new_run_id(), RunReport::new_run_id());
    }
}
