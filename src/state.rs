//! Run state threaded through the pipeline.
//!
//! Nodes never mutate [`RunState`]. They read an immutable snapshot and
//! return a [`StateDelta`]; the executor folds deltas into the state at
//! barrier points using the reducers in [`crate::reducer`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, SynthesisError, ValidationError};
use crate::evidence::{Evidence, EvidenceMap};
use crate::graph::NodeId;
use crate::opinion::Opinion;
use crate::reducer;
use crate::verdict::{Flag, Verdict};

/// What to audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInput {
    /// Absolute URI of the code repository.
    pub subject_url: String,
    /// Accompanying documents.
    #[serde(default)]
    pub document_paths: Vec<String>,
}

impl RunInput {
    /// Creates a run input without documents.
    #[must_use]
    pub fn new(subject_url: impl Into<String>) -> Self {
        Self {
            subject_url: subject_url.into(),
            document_paths: Vec::new(),
        }
    }

    /// Adds a document path.
    #[must_use]
    pub fn with_document(mut self, path: impl Into<String>) -> Self {
        self.document_paths.push(path.into());
        self
    }
}

/// Category of an error recorded during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Pre-flight validation failed.
    Configuration,
    /// A collector faulted.
    Collector,
    /// A scorer faulted or emitted an invalid opinion.
    Scorer,
    /// A node exceeded its timeout.
    Timeout,
    /// A node panicked.
    Panic,
    /// A routing function returned an undeclared target.
    Routing,
    /// The adjudicator degraded a result.
    Synthesis,
    /// A delta was rejected by the reducers.
    Merge,
}

impl ErrorKind {
    /// Returns a short stable identifier.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Collector => "collector",
            Self::Scorer => "scorer",
            Self::Timeout => "timeout",
            Self::Panic => "panic",
            Self::Routing => "routing",
            Self::Synthesis => "synthesis",
            Self::Merge => "merge",
        }
    }
}

/// A structured, non-fatal error entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    /// Node that recorded the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    /// Category.
    pub kind: ErrorKind,
    /// Description.
    pub message: String,
}

impl RunError {
    /// Creates an error entry.
    #[must_use]
    pub fn new(node: Option<NodeId>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            node,
            kind,
            message: message.into(),
        }
    }

    /// Records a node fault.
    #[must_use]
    pub fn from_node_error(node: NodeId, err: &NodeError) -> Self {
        let kind = match err {
            NodeError::Collector { .. } | NodeError::Lease { .. } => ErrorKind::Collector,
            NodeError::Scorer { .. } => ErrorKind::Scorer,
            NodeError::Timeout { .. } => ErrorKind::Timeout,
            NodeError::Panicked { .. } => ErrorKind::Panic,
        };
        Self::new(Some(node), kind, err.to_string())
    }

    /// Records a pre-flight validation failure.
    #[must_use]
    pub fn configuration(node: NodeId, err: &ValidationError) -> Self {
        Self::new(Some(node), ErrorKind::Configuration, err.to_string())
    }

    /// Records a degraded synthesis.
    #[must_use]
    pub fn synthesis(node: NodeId, err: &SynthesisError) -> Self {
        Self::new(Some(node), ErrorKind::Synthesis, err.to_string())
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node {
            Some(node) => write!(f, "[{node}] {}: {}", self.kind.label(), self.message),
            None => write!(f, "{}: {}", self.kind.label(), self.message),
        }
    }
}

/// Partial state written by one node.
///
/// Evidence is kept in build order; several records for one dimension are
/// allowed here and collapsed by the keyed override-union on merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Evidence built by the node, in build order.
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    /// Opinions emitted by the node.
    #[serde(default)]
    pub opinions: Vec<Opinion>,
    /// Errors recorded by the node.
    #[serde(default)]
    pub errors: Vec<RunError>,
    /// Flags raised by the node.
    #[serde(default)]
    pub flags: Vec<Flag>,
    /// Terminal verdict, written by the adjudicator only.
    #[serde(default)]
    pub verdict: Option<Verdict>,
}

impl StateDelta {
    /// True when the delta writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.evidence.is_empty()
            && self.opinions.is_empty()
            && self.errors.is_empty()
            && self.flags.is_empty()
            && self.verdict.is_none()
    }

    /// Builds a delta carrying a single error.
    #[must_use]
    pub fn from_error(error: RunError) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }
}

/// The mutable container threaded through a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Run input.
    pub input: RunInput,
    /// One canonical evidence record per dimension.
    pub evidence: EvidenceMap,
    /// Every opinion emitted, in merge order.
    pub opinions: Vec<Opinion>,
    /// Every error recorded. Never cleared.
    pub errors: Vec<RunError>,
    /// Consistency flags.
    pub flags: Vec<Flag>,
    /// Terminal verdict. Once set, the state is sealed.
    pub verdict: Option<Verdict>,
}

impl RunState {
    /// Creates an empty state for `input`.
    #[must_use]
    pub fn new(input: RunInput) -> Self {
        Self {
            input,
            evidence: EvidenceMap::new(),
            opinions: Vec::new(),
            errors: Vec::new(),
            flags: Vec::new(),
            verdict: None,
        }
    }

    /// True once the terminal verdict has been written.
    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.verdict.is_some()
    }

    /// Folds a delta into the state using the field reducers.
    ///
    /// A sealed state rejects every further delta and is left unchanged.
    pub fn apply(&mut self, delta: StateDelta) -> Result<(), RunError> {
        if self.is_sealed() {
            return Err(RunError::new(
                None,
                ErrorKind::Merge,
                "run state is sealed; delta discarded",
            ));
        }

        let StateDelta {
            evidence,
            opinions,
            errors,
            flags,
            verdict,
        } = delta;

        let incoming = reducer::collapse_evidence(evidence);
        let current = std::mem::take(&mut self.evidence);
        self.evidence = reducer::override_union(current, incoming);
        reducer::append(&mut self.opinions, opinions);
        reducer::append(&mut self.errors, errors);
        reducer::append(&mut self.flags, flags);
        self.verdict = verdict;
        Ok(())
    }

    /// Opinions for one dimension, in merge order.
    pub fn opinions_for<'a>(&'a self, dimension: &'a str) -> impl Iterator<Item = &'a Opinion> + 'a {
        self.opinions
            .iter()
            .filter(move |o| o.dimension_id.as_str() == dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opinion::VoterRole;

    fn state() -> RunState {
        RunState::new(RunInput::new("https://github.com/acme/repo"))
    }

    #[test]
    fn apply_merges_every_field() {
        let mut s = state();
        let delta = StateDelta {
            evidence: vec![Evidence::new("a", "repo", "scan", "x")],
            opinions: vec![Opinion::new("a", VoterRole::Defense, 4, "ok")],
            errors: vec![RunError::new(Some(NodeId::DocAnalyst), ErrorKind::Collector, "pdf missing")],
            ..StateDelta::default()
        };
        s.apply(delta).unwrap();
        assert_eq!(s.evidence.len(), 1);
        assert_eq!(s.opinions.len(), 1);
        assert_eq!(s.errors.len(), 1);
        assert!(!s.is_sealed());
    }

    #[test]
    fn errors_accumulate_across_merges() {
        let mut s = state();
        for i in 0..3 {
            s.apply(StateDelta::from_error(RunError::new(None, ErrorKind::Collector, format!("e{i}"))))
                .unwrap();
        }
        s.apply(StateDelta::default()).unwrap();
        assert_eq!(s.errors.len(), 3);
    }

    #[test]
    fn sealed_state_rejects_deltas() {
        let mut s = state();
        let verdict = Verdict::invalid_configuration("x", Vec::new(), Vec::new());
        s.apply(StateDelta {
            verdict: Some(verdict),
            ..StateDelta::default()
        })
        .unwrap();
        assert!(s.is_sealed());

        let before = s.clone();
        let err = s
            .apply(StateDelta::from_error(RunError::new(None, ErrorKind::Scorer, "late")))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Merge);
        assert_eq!(s, before);
    }

    #[test]
    fn run_error_display_names_node() {
        let err = RunError::from_node_error(NodeId::RepoInvestigator, &NodeError::Timeout { duration_ms: 10 });
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.to_string().starts_with("[repo_investigator] timeout:"));
    }
}
