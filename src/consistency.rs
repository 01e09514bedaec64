//! Cross-dimension anomaly scan.
//!
//! Runs once over the merged evidence and opinions before adjudication.
//! Flags are advisory records; whether they block a passing verdict is
//! decided by [`FlagKind::blocks_pass`].

use crate::config::ConsistencyConfig;
use crate::dimension::DimensionId;
use crate::error::NodeError;
use crate::evidence::EvidenceMap;
use crate::graph::{DeltaSink, Node};
use crate::opinion::Opinion;
use crate::state::RunState;
use crate::verdict::{Flag, FlagKind};

fn opinions_for<'a>(opinions: &'a [Opinion], dimension: &'a DimensionId) -> impl Iterator<Item = &'a Opinion> + 'a {
    opinions.iter().filter(move |o| &o.dimension_id == dimension)
}

/// Dimensions where more than half of the opinions are failing scores.
#[must_use]
pub fn failing_dimensions(evidence: &EvidenceMap, opinions: &[Opinion], config: &ConsistencyConfig) -> Vec<DimensionId> {
    evidence
        .keys()
        .filter(|dim| {
            let (total, failing) = opinions_for(opinions, dim).fold((0usize, 0usize), |(t, f), o| {
                (t + 1, f + usize::from(o.score <= config.failing_score_max))
            });
            total > 0 && failing * 2 > total
        })
        .cloned()
        .collect()
}

/// Dimensions whose evidence signals absence while every voter scored high.
#[must_use]
pub fn contradicted_dimensions(evidence: &EvidenceMap, opinions: &[Opinion], config: &ConsistencyConfig) -> Vec<DimensionId> {
    evidence
        .iter()
        .filter(|(dim, record)| {
            let content = record.content.to_lowercase();
            let signals_absence = config
                .absence_markers
                .iter()
                .any(|m| !m.is_empty() && content.contains(&m.to_lowercase()));
            if !signals_absence {
                return false;
            }
            let mut scores = opinions_for(opinions, dim).map(|o| o.score).peekable();
            scores.peek().is_some() && scores.all(|s| s >= config.high_score_min)
        })
        .map(|(dim, _)| dim.clone())
        .collect()
}

/// Runs every check and returns the flags raised, in a fixed order.
#[must_use]
pub fn scan(evidence: &EvidenceMap, opinions: &[Opinion], config: &ConsistencyConfig) -> Vec<Flag> {
    let mut flags = Vec::new();

    let failing = failing_dimensions(evidence, opinions, config);
    if failing.len() > config.systemic_failure_count {
        flags.push(
            Flag::new(
                FlagKind::SystemicFailure,
                format!(
                    "Systemic failure: {} dimensions are failing, pointing to a cross-dimension architectural problem",
                    failing.len()
                ),
            )
            .with_dimensions(failing),
        );
    }

    for dimension in contradicted_dimensions(evidence, opinions, config) {
        flags.push(
            Flag::new(
                FlagKind::PossibleFalsePositive,
                format!("Possible false positive: evidence for '{dimension}' signals absence but every opinion scored high"),
            )
            .with_dimensions(vec![dimension]),
        );
    }

    let oversized: Vec<DimensionId> = evidence
        .values()
        .filter(|e| e.payload_len() > config.max_evidence_bytes)
        .map(|e| e.dimension_id.clone())
        .collect();
    if !oversized.is_empty() {
        flags.push(
            Flag::new(
                FlagKind::Complexity,
                format!(
                    "Complexity warning: {} evidence payload(s) exceed {} bytes; consider modularizing",
                    oversized.len(),
                    config.max_evidence_bytes
                ),
            )
            .with_dimensions(oversized),
        );
    }

    let total_lines: u64 = evidence.values().filter_map(|e| e.metadata.line_count).sum();
    if total_lines > config.max_total_lines {
        flags.push(Flag::new(
            FlagKind::Complexity,
            format!(
                "Complexity warning: {total_lines} analyzed lines exceed the limit of {}",
                config.max_total_lines
            ),
        ));
    }

    flags
}

/// Anomaly checker node.
#[derive(Debug, Clone)]
pub struct ConsistencyNode {
    config: ConsistencyConfig,
}

impl ConsistencyNode {
    /// Creates the node.
    #[must_use]
    pub fn new(config: ConsistencyConfig) -> Self {
        Self { config }
    }
}

impl Node for ConsistencyNode {
    fn run(&self, state: &RunState, out: &DeltaSink) -> Result<(), NodeError> {
        let flags = scan(&state.evidence, &state.opinions, &self.config);
        tracing::info!(
            dimensions = state.evidence.len(),
            opinions = state.opinions.len(),
            flags = flags.len(),
            "consistency scan finished"
        );
        for flag in flags {
            tracing::warn!(kind = ?flag.kind, message = %flag.message, "flag raised");
            out.push_flag(flag);
        }
        Ok(())
    }
}
