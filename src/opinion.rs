//! Opinions produced by scorers (voters).
//!
//! Opinions are append-only. The adjudicator never edits a submitted
//! opinion; when it overrules one it works on an annotated copy that keeps
//! the original score for the audit trail.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dimension::DimensionId;
use crate::error::ValidationError;

/// Perspective a voter argues from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoterRole {
    /// Adversarial reviewer looking for gaps and security flaws.
    Prosecutor,
    /// Reviewer rewarding effort and intent.
    Defense,
    /// Pragmatic reviewer focused on whether it works.
    TechLead,
}

impl VoterRole {
    /// Every role, in canonical order.
    pub const ALL: [VoterRole; 3] = [Self::Prosecutor, Self::Defense, Self::TechLead];

    /// Returns a short stable identifier suitable for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Prosecutor => "prosecutor",
            Self::Defense => "defense",
            Self::TechLead => "tech_lead",
        }
    }
}

impl fmt::Display for VoterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prosecutor => "Prosecutor",
            Self::Defense => "Defense",
            Self::TechLead => "TechLead",
        };
        f.write_str(name)
    }
}

/// Inclusive numeric range every score is clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreRange {
    /// Lowest valid score.
    pub min: u8,
    /// Highest valid score.
    pub max: u8,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self { min: 1, max: 5 }
    }
}

impl ScoreRange {
    /// Creates a validated range.
    pub fn new(min: u8, max: u8) -> Result<Self, ValidationError> {
        let range = Self { min, max };
        range.validate()?;
        Ok(range)
    }

    /// Rejects empty ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.min >= self.max {
            return Err(ValidationError::EmptyScoreRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    /// Clamps a score into the range.
    #[must_use]
    pub fn clamp(&self, score: u8) -> u8 {
        score.clamp(self.min, self.max)
    }

    /// True when `score` is inside the range.
    #[must_use]
    pub fn contains(&self, score: f64) -> bool {
        (f64::from(self.min)..=f64::from(self.max)).contains(&score)
    }
}

/// Annotation attached to an adjudicator-made copy of an overruled opinion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrule {
    /// Score the voter actually submitted.
    pub original_score: u8,
    /// Why the score was lowered.
    pub note: String,
}

/// A voter's judgement of a single dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opinion {
    /// Dimension being judged.
    pub dimension_id: DimensionId,
    /// Perspective of the voter that produced this opinion.
    pub voter_role: VoterRole,
    /// Score inside the configured [`ScoreRange`].
    pub score: u8,
    /// Reasoning for the score.
    pub rationale: String,
    /// Evidence locations the rationale relies on.
    #[serde(default)]
    pub cited_evidence: Vec<String>,
    /// Present only on adjudicator copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrule: Option<Overrule>,
}

impl Opinion {
    /// Creates a fresh, un-annotated opinion.
    #[must_use]
    pub fn new(
        dimension_id: impl Into<DimensionId>,
        voter_role: VoterRole,
        score: u8,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            dimension_id: dimension_id.into(),
            voter_role,
            score,
            rationale: rationale.into(),
            cited_evidence: Vec::new(),
            overrule: None,
        }
    }

    /// Adds an evidence citation.
    #[must_use]
    pub fn citing(mut self, location: impl Into<String>) -> Self {
        self.cited_evidence.push(location.into());
        self
    }

    /// The score the voter submitted, regardless of later overrules.
    #[must_use]
    pub fn raw_score(&self) -> u8 {
        self.overrule
            .as_ref()
            .map_or(self.score, |o| o.original_score)
    }

    /// True for adjudicator copies whose score was lowered.
    #[must_use]
    pub const fn is_overruled(&self) -> bool {
        self.overrule.is_some()
    }

    /// Returns a copy with the score capped at `ceiling` and an overrule note.
    ///
    /// `self` is left untouched. Opinions already at or below the ceiling are
    /// returned unannotated.
    #[must_use]
    pub fn overruled(&self, ceiling: u8, note: impl Into<String>) -> Self {
        let mut copy = self.clone();
        if self.score > ceiling {
            copy.score = ceiling;
            copy.overrule = Some(Overrule {
                original_score: self.raw_score(),
                note: note.into(),
            });
        }
        copy
    }
}
