//! Evidence records produced by collectors.
//!
//! Evidence is immutable once built. A collector owns the records it
//! creates until the engine merges them into run state; after the merge
//! there is exactly one canonical record per dimension.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dimension::DimensionId;
use crate::error::ValidationError;

/// Canonical evidence keyed by dimension. Ordered so iteration is stable.
pub type EvidenceMap = BTreeMap<DimensionId, Evidence>;

/// Typed metadata attached to an evidence record.
///
/// The key set is closed; unknown keys are rejected on deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvidenceMetadata {
    /// Whether the inspected artifact exists. `Some(false)` triggers fact supremacy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub found: Option<bool>,

    /// File path, commit hash or document page the evidence points at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Collector's explanation of the finding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    /// Collector confidence in [0.0, 1.0].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    /// Lines of code analyzed to produce this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u64>,

    /// Files analyzed to produce this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_count: Option<u64>,
}

impl EvidenceMetadata {
    /// Validates value ranges.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(value) = self.confidence {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::ConfidenceOutOfRange { value });
            }
        }
        Ok(())
    }
}

/// A single piece of evidence supporting one rubric dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Rubric axis this evidence supports.
    pub dimension_id: DimensionId,
    /// Collector (or tool) that produced the record.
    pub source: String,
    /// Free-form category, e.g. `ast_scan` or `git_log`.
    pub kind: String,
    /// The finding itself.
    pub content: String,
    /// Typed metadata.
    #[serde(default)]
    pub metadata: EvidenceMetadata,
    /// When the record was built.
    pub collected_at: DateTime<Utc>,
}

impl Evidence {
    /// Creates evidence stamped with the current time and empty metadata.
    #[must_use]
    pub fn new(
        dimension_id: impl Into<DimensionId>,
        source: impl Into<String>,
        kind: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            dimension_id: dimension_id.into(),
            source: source.into(),
            kind: kind.into(),
            content: content.into(),
            metadata: EvidenceMetadata::default(),
            collected_at: Utc::now(),
        }
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: EvidenceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Marks whether the inspected artifact was found.
    #[must_use]
    pub fn with_found(mut self, found: bool) -> Self {
        self.metadata.found = Some(found);
        self
    }

    /// Records analyzed line count.
    #[must_use]
    pub fn with_line_count(mut self, lines: u64) -> Self {
        self.metadata.line_count = Some(lines);
        self
    }

    /// Overrides the collection timestamp (used when replaying recorded runs).
    #[must_use]
    pub fn with_collected_at(mut self, at: DateTime<Utc>) -> Self {
        self.collected_at = at;
        self
    }

    /// True when the collector reported the underlying artifact as absent.
    #[must_use]
    pub fn artifact_missing(&self) -> bool {
        self.metadata.found == Some(false)
    }

    /// Size of the textual payload in bytes.
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.content.len()
    }
}
