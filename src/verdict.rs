//! Terminal run output: per-dimension results and the overall verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dimension::DimensionId;
use crate::opinion::Opinion;
use crate::state::RunError;

/// Category of a consistency flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    /// Many dimensions fail together, pointing at an architectural problem.
    SystemicFailure,
    /// Evidence signals absence while every voter scored high.
    PossibleFalsePositive,
    /// Evidence payloads or analyzed size exceed configured limits.
    Complexity,
}

impl FlagKind {
    /// Whether a flag of this kind prevents the verdict from passing.
    #[must_use]
    pub const fn blocks_pass(self) -> bool {
        match self {
            Self::SystemicFailure | Self::PossibleFalsePositive => true,
            Self::Complexity => false,
        }
    }
}

/// A cross-dimension anomaly, reported verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    /// Category.
    pub kind: FlagKind,
    /// Human-readable description.
    pub message: String,
    /// Dimensions involved, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<DimensionId>,
}

impl Flag {
    /// Creates a flag.
    #[must_use]
    pub fn new(kind: FlagKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            dimensions: Vec::new(),
        }
    }

    /// Attaches the dimensions involved.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: Vec<DimensionId>) -> Self {
        self.dimensions = dimensions;
        self
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Adjudicated result for one dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    /// Dimension judged.
    pub dimension_id: DimensionId,
    /// Title-cased dimension name.
    pub dimension_name: String,
    /// Synthesized score.
    pub final_score: u8,
    /// Opinions used, with overruled ones replaced by annotated copies.
    pub contributing_opinions: Vec<Opinion>,
    /// Present when the opposing voters disagreed significantly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dissent_note: Option<String>,
    /// Concrete instruction for improvement.
    pub remediation: String,
    /// Overrides applied while synthesizing the score.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// True when the score is a conservative default (no data or no recognized voters).
    #[serde(default)]
    pub low_confidence: bool,
}

/// One entry of the remediation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationItem {
    /// Dimension to fix.
    pub dimension_id: DimensionId,
    /// Score that put it on the plan.
    pub final_score: u8,
    /// What to do.
    pub action: String,
}

/// The verdict of a run. Produced exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    /// Subject that was audited.
    pub subject_url: String,
    /// Arithmetic mean of all final scores (0.0 when nothing was scored).
    pub overall_score: f64,
    /// Overall gate.
    pub passed: bool,
    /// Executive summary.
    pub summary: String,
    /// One result per dimension with evidence, ordered by dimension id.
    pub per_dimension: Vec<CriterionResult>,
    /// Consistency flags, verbatim.
    pub flags: Vec<Flag>,
    /// Every error recorded during the run.
    pub errors: Vec<RunError>,
    /// Remediation items, lowest score first.
    pub remediation_plan: Vec<RemediationItem>,
}

impl Verdict {
    /// Terminal verdict for a run stopped by pre-flight validation.
    #[must_use]
    pub fn invalid_configuration(subject_url: impl Into<String>, errors: Vec<RunError>, flags: Vec<Flag>) -> Self {
        let summary = format!(
            "Run aborted before analysis: invalid configuration ({} error(s)). No dimensions were scored.",
            errors.len()
        );
        Self {
            subject_url: subject_url.into(),
            overall_score: 0.0,
            passed: false,
            summary,
            per_dimension: Vec::new(),
            flags,
            errors,
            remediation_plan: Vec::new(),
        }
    }

    /// Looks up the result for a dimension.
    #[must_use]
    pub fn criterion(&self, dimension: &str) -> Option<&CriterionResult> {
        self.per_dimension
            .iter()
            .find(|r| r.dimension_id.as_str() == dimension)
    }

    /// True when at least one flag blocks passing.
    #[must_use]
    pub fn has_blocking_flags(&self) -> bool {
        self.flags.iter().any(|f| f.kind.blocks_pass())
    }

    /// BLAKE3 digest of the canonical JSON form, hex encoded.
    ///
    /// Two runs over identical collector and scorer outputs yield the same digest.
    #[must_use]
    pub fn digest(&self) -> String {
        // Serializing plain data into memory cannot fail.
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ErrorKind;

    #[test]
    fn complexity_flags_are_advisory() {
        assert!(FlagKind::SystemicFailure.blocks_pass());
        assert!(FlagKind::PossibleFalsePositive.blocks_pass());
        assert!(!FlagKind::Complexity.blocks_pass());
    }

    #[test]
    fn invalid_configuration_scores_nothing() {
        let errors = vec![RunError::new(None, ErrorKind::Configuration, "bad url")];
        let verdict = Verdict::invalid_configuration("ftp://x", errors, Vec::new());
        assert!(!verdict.passed);
        assert!(verdict.per_dimension.is_empty());
        assert_eq!(verdict.errors.len(), 1);
        assert!(verdict.summary.contains("invalid configuration"));
    }

    #[test]
    fn digest_tracks_content() {
        let a = Verdict::invalid_configuration("https://a", Vec::new(), Vec::new());
        let b = a.clone();
        let c = Verdict::invalid_configuration("https://b", Vec::new(), Vec::new());
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), c.digest());
        assert_eq!(a.digest().len(), 64);
    }
}
