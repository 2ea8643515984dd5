use std::fmt;

use serde::{Deserialize, Serialize};

/// Metric recorded when the vision audit could not run and the check was
/// passed by policy.
pub const AUDIT_FALLBACK_METRIC: &str = "API_ERROR (Pass by default)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    TextFidelity,
    MobileReadability,
    Contrast,
    VisualIntegrity,
}

impl CheckName {
    /// Gate order. Failure reasons are reported in this order.
    pub const ALL: [CheckName; 4] = [
        CheckName::TextFidelity,
        CheckName::MobileReadability,
        CheckName::Contrast,
        CheckName::VisualIntegrity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextFidelity => "text_fidelity",
            Self::MobileReadability => "mobile_readability",
            Self::Contrast => "contrast",
            Self::VisualIntegrity => "visual_integrity",
        }
    }

    pub fn failure_reason(self) -> &'static str {
        match self {
            Self::TextFidelity => "text_fidelity (OCR did not detect expected title)",
            Self::MobileReadability => "mobile_readability (title not readable at 200px)",
            Self::Contrast => "contrast (image contrast below threshold)",
            Self::VisualIntegrity => "visual_integrity (LLM: faces/text/artifacts detected)",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckMetric {
    Number(f64),
    Text(String),
}

impl fmt::Display for CheckMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value:.4}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: CheckName,
    pub passed: bool,
    pub metric: CheckMetric,
    pub detail: String,
}

impl CheckResult {
    pub fn new(name: CheckName, passed: bool, metric: CheckMetric, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed,
            metric,
            detail: detail.into(),
        }
    }

    pub fn audit_recovered(&self) -> bool {
        self.name == CheckName::VisualIntegrity
            && matches!(&self.metric, CheckMetric::Text(text) if text == AUDIT_FALLBACK_METRIC)
    }
}

/// Combined gate decision over one attempt's checks.
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub passed: bool,
    pub failure_reasons: Vec<String>,
}

/// An attempt passes iff every gate check is present and passed. A check that
/// is missing from `checks` counts as failed.
pub fn combine(checks: &[CheckResult]) -> GateVerdict {
    let failure_reasons: Vec<String> = CheckName::ALL
        .iter()
        .filter(|name| {
            !checks
                .iter()
                .any(|check| check.name == **name && check.passed)
        })
        .map(|name| name.failure_reason().to_string())
        .collect();

    GateVerdict {
        passed: failure_reasons.is_empty(),
        failure_reasons,
    }
}
