//! Scorer (voter) seam.
//!
//! A [`Scorer`] reads the full merged evidence map and emits opinions. The
//! [`OpinionSink`] it writes through enforces the voter contract: the role
//! is stamped from the scorer, scores are clamped into the configured
//! range, and at most one opinion per dimension is accepted.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::dimension::DimensionId;
use crate::error::NodeError;
use crate::evidence::EvidenceMap;
use crate::graph::{DeltaSink, Node, NodeId};
use crate::opinion::{Opinion, ScoreRange, VoterRole};
use crate::state::{ErrorKind, RunError, RunState};

/// Produces one opinion per examined dimension.
pub trait Scorer: Send + Sync {
    /// Perspective this scorer votes from.
    fn role(&self) -> VoterRole;

    /// Name used in logs and error records.
    fn name(&self) -> &str {
        self.role().label()
    }

    /// Scores the evidence. Must not depend on map iteration order.
    fn score(&self, evidence: &EvidenceMap, out: &OpinionSink<'_>) -> Result<(), NodeError>;
}

/// Graph node id for a voter role.
#[must_use]
pub const fn node_for(role: VoterRole) -> NodeId {
    match role {
        VoterRole::Prosecutor => NodeId::Prosecutor,
        VoterRole::Defense => NodeId::Defense,
        VoterRole::TechLead => NodeId::TechLead,
    }
}

/// Contract-enforcing opinion output handed to a scorer.
pub struct OpinionSink<'a> {
    out: &'a DeltaSink,
    node: NodeId,
    role: VoterRole,
    range: ScoreRange,
    evidence: &'a EvidenceMap,
    seen: Mutex<BTreeSet<DimensionId>>,
}

impl<'a> OpinionSink<'a> {
    /// Wraps a node's delta sink.
    #[must_use]
    pub fn new(out: &'a DeltaSink, node: NodeId, role: VoterRole, range: ScoreRange, evidence: &'a EvidenceMap) -> Self {
        Self {
            out,
            node,
            role,
            range,
            evidence,
            seen: Mutex::new(BTreeSet::new()),
        }
    }

    fn reject(&self, message: String) {
        tracing::warn!(node = %self.node, %message, "opinion rejected");
        self.out
            .push_error(RunError::new(Some(self.node), ErrorKind::Scorer, message));
    }

    /// Records an opinion. Returns false when it was rejected.
    pub fn push(&self, mut opinion: Opinion) -> bool {
        if !self.evidence.contains_key(&opinion.dimension_id) {
            self.reject(format!(
                "opinion for '{}' has no evidence to judge",
                opinion.dimension_id
            ));
            return false;
        }

        {
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            if !seen.insert(opinion.dimension_id.clone()) {
                drop(seen);
                self.reject(format!(
                    "duplicate opinion for '{}' discarded",
                    opinion.dimension_id
                ));
                return false;
            }
        }

        let clamped = self.range.clamp(opinion.score);
        if clamped != opinion.score {
            tracing::warn!(
                node = %self.node,
                dimension = %opinion.dimension_id,
                score = opinion.score,
                clamped,
                "score outside range; clamped"
            );
        }
        opinion.score = clamped;
        opinion.voter_role = self.role;
        opinion.overrule = None;
        self.out.push_opinion(opinion);
        true
    }
}

/// Graph node running one scorer under a timeout.
pub struct ScorerNode {
    scorer: Arc<dyn Scorer>,
    range: ScoreRange,
    timeout: Duration,
}

impl ScorerNode {
    /// Creates a scorer node.
    #[must_use]
    pub fn new(scorer: Arc<dyn Scorer>, range: ScoreRange, timeout: Duration) -> Self {
        Self { scorer, range, timeout }
    }

    /// Node id this scorer is registered under.
    #[must_use]
    pub fn id(&self) -> NodeId {
        node_for(self.scorer.role())
    }
}

impl Node for ScorerNode {
    fn run(&self, state: &RunState, out: &DeltaSink) -> Result<(), NodeError> {
        let sink = OpinionSink::new(out, self.id(), self.scorer.role(), self.range, &state.evidence);
        self.scorer.score(&state.evidence, &sink)
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }
}
