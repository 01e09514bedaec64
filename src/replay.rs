//! Recorded collector and scorer outputs.
//!
//! A fixture is a JSON document holding what each collector produced and
//! what each voter said. Replaying it reproduces a run deterministically
//! without the external inspection or generation subsystems. Faults can be
//! injected: a collector may fail after N of its M items, a scorer may fail
//! after emitting its opinions, and either may be delayed to exercise
//! timeouts.
//!
//! ```json
//! {
//!   "collectors": {
//!     "repository": {
//!       "evidence": [
//!         { "dimension_id": "git_forensic_analysis", "kind": "git_log",
//!           "content": "42 commits", "metadata": { "found": true } }
//!       ],
//!       "fail_after": 1,
//!       "error": "clone interrupted"
//!     }
//!   },
//!   "scorers": {
//!     "tech_lead": {
//!       "opinions": [
//!         { "dimension_id": "git_forensic_analysis", "score": 4, "rationale": "steady history" }
//!       ]
//!     }
//!   }
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::collector::{Collector, EvidenceSink, Lease};
use crate::dimension::DimensionId;
use crate::error::{NodeError, TribunalError, TribunalResult, ValidationError};
use crate::evidence::{Evidence, EvidenceMap, EvidenceMetadata};
use crate::opinion::{Opinion, VoterRole};
use crate::pipeline::{CollectorSlot, PipelineBuilder};
use crate::scorer::{OpinionSink, Scorer};
use crate::state::RunInput;

const DEFAULT_FAULT: &str = "injected fault";

/// One recorded evidence item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvidence {
    /// Dimension the item supports.
    pub dimension_id: DimensionId,
    /// Producing tool; defaults to the collector name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Category.
    pub kind: String,
    /// Finding.
    pub content: String,
    /// Typed metadata.
    #[serde(default)]
    pub metadata: EvidenceMetadata,
    /// Recorded timestamp; the Unix epoch when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<DateTime<Utc>>,
}

impl RecordedEvidence {
    fn to_evidence(&self, collector: &str) -> Evidence {
        Evidence::new(
            self.dimension_id.clone(),
            self.source.as_deref().unwrap_or(collector),
            self.kind.clone(),
            self.content.clone(),
        )
        .with_metadata(self.metadata.clone())
        .with_collected_at(self.collected_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
    }
}

/// What one collector produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedCollector {
    /// Items, in build order.
    #[serde(default)]
    pub evidence: Vec<RecordedEvidence>,
    /// Fail after this many items have been built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_after: Option<usize>,
    /// Fault message. Without `fail_after` the fault fires after the last item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sleep before each item, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}

/// One recorded opinion; the role comes from the scorer it is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedOpinion {
    /// Dimension judged.
    pub dimension_id: DimensionId,
    /// Score as submitted (clamped on replay).
    pub score: u8,
    /// Reasoning.
    pub rationale: String,
    /// Evidence citations.
    #[serde(default)]
    pub cited_evidence: Vec<String>,
}

/// What one voter said.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedScorer {
    /// Opinions, in emission order.
    #[serde(default)]
    pub opinions: Vec<RecordedOpinion>,
    /// Fault raised after the opinions are emitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Sleep before scoring, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}

/// Recorded collectors by slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordedCollectors {
    /// Repository investigator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<RecordedCollector>,
    /// Document analyst.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<RecordedCollector>,
    /// Vision inspector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision: Option<RecordedCollector>,
}

/// Recorded scorers by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordedScorers {
    /// Prosecutor opinions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prosecutor: Option<RecordedScorer>,
    /// Defense opinions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense: Option<RecordedScorer>,
    /// Tech lead opinions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tech_lead: Option<RecordedScorer>,
}

/// A complete recorded run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    /// Collector outputs.
    #[serde(default)]
    pub collectors: RecordedCollectors,
    /// Voter outputs.
    #[serde(default)]
    pub scorers: RecordedScorers,
}

impl Fixture {
    /// Parses a fixture from JSON.
    pub fn from_json_str(text: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(text).map_err(|e| ValidationError::MalformedFixture { reason: e.to_string() })
    }

    /// Reads a fixture file.
    pub fn load(path: &Path) -> TribunalResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TribunalError::io(path.display().to_string(), e))?;
        let fixture = Self::from_json_str(&text).map_err(|e| match e {
            ValidationError::MalformedFixture { reason } => ValidationError::MalformedFixture {
                reason: format!("{}: {reason}", path.display()),
            },
            other => other,
        })?;
        tracing::debug!(path = %path.display(), "fixture loaded");
        Ok(fixture)
    }

    /// Serializes the fixture as pretty JSON.
    pub fn to_json_string(&self) -> TribunalResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TribunalError::internal(format!("fixture serialization failed: {e}")))
    }

    /// Registers a replaying collector or scorer for every recording.
    #[must_use]
    pub fn register(&self, mut builder: PipelineBuilder) -> PipelineBuilder {
        let collectors = [
            (CollectorSlot::Repository, "repo_investigator", &self.collectors.repository),
            (CollectorSlot::Documents, "doc_analyst", &self.collectors.documents),
            (CollectorSlot::Vision, "vision_inspector", &self.collectors.vision),
        ];
        for (slot, name, recording) in collectors {
            if let Some(recording) = recording {
                builder = builder.collector(slot, Arc::new(ReplayCollector::new(name, recording.clone())));
            }
        }

        let scorers = [
            (VoterRole::Prosecutor, &self.scorers.prosecutor),
            (VoterRole::Defense, &self.scorers.defense),
            (VoterRole::TechLead, &self.scorers.tech_lead),
        ];
        for (role, recording) in scorers {
            if let Some(recording) = recording {
                builder = builder.scorer(Arc::new(ReplayScorer::new(role, recording.clone())));
            }
        }
        builder
    }
}

/// Collector that replays a recording.
#[derive(Debug, Clone)]
pub struct ReplayCollector {
    name: String,
    recording: RecordedCollector,
}

impl ReplayCollector {
    /// Creates a replaying collector.
    #[must_use]
    pub fn new(name: impl Into<String>, recording: RecordedCollector) -> Self {
        Self {
            name: name.into(),
            recording,
        }
    }

    fn fault(&self) -> NodeError {
        NodeError::collector(
            self.name.clone(),
            self.recording.error.as_deref().unwrap_or(DEFAULT_FAULT),
        )
    }
}

impl Collector for ReplayCollector {
    fn name(&self) -> &str {
        &self.name
    }

    fn collect(&self, _input: &RunInput, _lease: Option<&Lease>, out: &EvidenceSink<'_>) -> Result<(), NodeError> {
        for (built, item) in self.recording.evidence.iter().enumerate() {
            if self.recording.fail_after == Some(built) {
                return Err(self.fault());
            }
            if self.recording.delay_ms > 0 {
                thread::sleep(Duration::from_millis(self.recording.delay_ms));
            }
            out.push(item.to_evidence(&self.name));
        }
        if self.recording.fail_after.is_some() || self.recording.error.is_some() {
            return Err(self.fault());
        }
        Ok(())
    }
}

/// Scorer that replays a recording.
#[derive(Debug, Clone)]
pub struct ReplayScorer {
    role: VoterRole,
    recording: RecordedScorer,
}

impl ReplayScorer {
    /// Creates a replaying scorer.
    #[must_use]
    pub fn new(role: VoterRole, recording: RecordedScorer) -> Self {
        Self { role, recording }
    }
}

impl Scorer for ReplayScorer {
    fn role(&self) -> VoterRole {
        self.role
    }

    fn score(&self, evidence: &EvidenceMap, out: &OpinionSink<'_>) -> Result<(), NodeError> {
        if self.recording.delay_ms > 0 {
            thread::sleep(Duration::from_millis(self.recording.delay_ms));
        }
        for recorded in &self.recording.opinions {
            // Recordings may cover dimensions this run did not collect.
            if !evidence.contains_key(&recorded.dimension_id) {
                continue;
            }
            let mut opinion = Opinion::new(recorded.dimension_id.clone(), self.role, recorded.score, recorded.rationale.clone());
            opinion.cited_evidence.clone_from(&recorded.cited_evidence);
            out.push(opinion);
        }
        match &self.recording.error {
            Some(message) => Err(NodeError::scorer(self.role.label(), message.clone())),
            None => Ok(()),
        }
    }
}
