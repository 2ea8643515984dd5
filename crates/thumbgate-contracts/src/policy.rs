use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Ordered escalation constraints, indexed by zero-based attempt number.
///
/// Entry 0 is normally `None`; each later entry restricts the visual domain
/// further. Attempts past the end of the list run without an extra constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    constraints: Vec<Option<String>>,
}

impl EscalationPolicy {
    pub fn new(constraints: Vec<Option<String>>) -> Self {
        Self { constraints }
    }

    /// Steers later attempts toward abstract, subject-free imagery.
    pub fn abstract_imagery() -> Self {
        Self::from_strs(&[
            None,
            Some("Abstract geometric shapes and tech patterns only. Strictly NO people or faces."),
            Some("Minimalist solid color gradient. Completely abstract. Zero human subjects or silhouettes."),
        ])
    }

    /// Steers later attempts toward plain, high-contrast backdrops for the title.
    pub fn negative_space() -> Self {
        Self::from_strs(&[
            None,
            Some("Focus on high-contrast negative space for text."),
            Some("Solid minimalist background, extreme high contrast."),
        ])
    }

    fn from_strs(entries: &[Option<&str>]) -> Self {
        Self::new(
            entries
                .iter()
                .map(|entry| entry.map(str::to_string))
                .collect(),
        )
    }

    pub fn constraint_for(&self, attempt_index: usize) -> Option<&str> {
        self.constraints
            .get(attempt_index)
            .and_then(|entry| entry.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self::abstract_imagery()
    }
}

/// What the visual-integrity check reports when the audit service errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditErrorPolicy {
    #[default]
    Pass,
    Fail,
}

/// How adapter and IO errors inside an attempt interact with the retry budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfraFailurePolicy {
    /// The failed attempt consumes budget like a gate failure.
    #[default]
    CountAgainstBudget,
    /// The first adapter error ends the request.
    Abort,
}
