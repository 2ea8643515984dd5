use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::checks::{combine, CheckResult};
use crate::plan::GenerationPlan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Pass,
    Fail,
}

/// One decompose → synthesize → composite → validate pass.
///
/// Built up by the orchestrator while the attempt runs and frozen once it is
/// pushed onto the run's attempt list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// 1-based.
    pub index: u32,
    pub constraint: Option<String>,
    pub plan: Option<GenerationPlan>,
    pub background_path: Option<PathBuf>,
    pub composite_path: Option<PathBuf>,
    #[serde(default)]
    pub checks: Vec<CheckResult>,
    pub outcome: AttemptOutcome,
    #[serde(default)]
    pub failure_reasons: Vec<String>,
    /// Set when an adapter or IO error cut the attempt short.
    pub error: Option<String>,
    /// SHA-256 of the composite's raw pixels.
    pub fingerprint: Option<String>,
}

impl Attempt {
    pub fn started(index: u32, constraint: Option<&str>) -> Self {
        Self {
            index,
            constraint: constraint.map(str::to_string),
            plan: None,
            background_path: None,
            composite_path: None,
            checks: Vec::new(),
            outcome: AttemptOutcome::Fail,
            failure_reasons: Vec::new(),
            error: None,
            fingerprint: None,
        }
    }

    pub fn record_checks(&mut self, checks: Vec<CheckResult>) {
        let verdict = combine(&checks);
        self.checks = checks;
        self.failure_reasons = verdict.failure_reasons;
        self.outcome = if verdict.passed {
            AttemptOutcome::Pass
        } else {
            AttemptOutcome::Fail
        };
    }

    pub fn abort(&mut self, message: String) {
        self.outcome = AttemptOutcome::Fail;
        self.failure_reasons = vec![message.clone()];
        self.error = Some(message);
    }

    pub fn passed(&self) -> bool {
        self.outcome == AttemptOutcome::Pass
    }

    pub fn aborted(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use crate::checks::{CheckMetric, CheckName, CheckResult};

    use super::{Attempt, AttemptOutcome};

    fn checks_with(failing: &[CheckName]) -> Vec<CheckResult> {
        CheckName::ALL
            .iter()
            .map(|name| {
                CheckResult::new(
                    *name,
                    !failing.contains(name),
                    CheckMetric::Number(0.5),
                    "",
                )
            })
            .collect()
    }

    #[test]
    fn new_attempt_is_failed_until_checks_arrive() {
        let attempt = Attempt::started(1, None);
        assert_eq!(attempt.outcome, AttemptOutcome::Fail);
        assert!(!attempt.aborted());
    }

    #[test]
    fn recorded_checks_decide_the_outcome() {
        let mut attempt = Attempt::started(2, Some("abstract only"));
        attempt.record_checks(checks_with(&[]));
        assert!(attempt.passed());
        assert!(attempt.failure_reasons.is_empty());

        let mut attempt = Attempt::started(3, None);
        attempt.record_checks(checks_with(&[CheckName::Contrast]));
        assert!(!attempt.passed());
        assert_eq!(
            attempt.failure_reasons,
            vec![CheckName::Contrast.failure_reason().to_string()]
        );
        assert_eq!(attempt.constraint, None);
    }

    #[test]
    fn abort_replaces_reasons_with_the_error() {
        let mut attempt = Attempt::started(1, None);
        attempt.abort("Gemini request failed (503)".to_string());
        assert!(attempt.aborted());
        assert_eq!(attempt.failure_reasons, vec!["Gemini request failed (503)"]);
        assert!(attempt.checks.is_empty());
    }
}
