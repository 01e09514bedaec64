//! The standard audit pipeline.
//!
//! ```text
//! preflight ─?─> repo_investigator ─┐
//!           ├──> doc_analyst ───────┼─> evidence_aggregator ─?─> prosecutor ─┐
//!           ├──> vision_inspector ──┘            │           ├─> defense ────┼─> consistency_check ─> chief_justice ─> END
//!           └──> END                             │           └─> tech_lead ──┘          ^
//!                                                └──────────────────────────────────────┘
//! ```
//!
//! Collector and scorer presence is fixed when the pipeline is built.
//! Nodes are always registered in the order shown, whatever order the
//! builder was called in, so collisions resolve the same way every run.

use std::sync::Arc;

use crate::adjudicator::{Adjudicator, ChiefJusticeNode};
use crate::collector::{Collector, CollectorNode};
use crate::config::TribunalConfig;
use crate::consistency::ConsistencyNode;
use crate::error::TribunalResult;
use crate::graph::{node_fn, Executor, Graph, NodeId, Target};
use crate::preflight::{collector_route, PreflightNode};
use crate::scorer::{Scorer, ScorerNode};
use crate::state::{ErrorKind, RunInput, RunState};
use crate::verdict::Verdict;

/// Position a collector occupies in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CollectorSlot {
    /// Inspects the code repository. Always routed.
    Repository,
    /// Inspects the accompanying documents. Routed only when documents are given.
    Documents,
    /// Inspects diagrams and media. Always routed.
    Vision,
}

impl CollectorSlot {
    /// Graph node for the slot.
    #[must_use]
    pub const fn node_id(self) -> NodeId {
        match self {
            Self::Repository => NodeId::RepoInvestigator,
            Self::Documents => NodeId::DocAnalyst,
            Self::Vision => NodeId::VisionInspector,
        }
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: TribunalConfig,
    collectors: Vec<(CollectorSlot, Arc<dyn Collector>)>,
    scorers: Vec<Arc<dyn Scorer>>,
}

impl PipelineBuilder {
    /// Starts a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: TribunalConfig) -> Self {
        self.config = config;
        self
    }

    /// Plugs a collector into a slot.
    #[must_use]
    pub fn collector(mut self, slot: CollectorSlot, collector: Arc<dyn Collector>) -> Self {
        self.collectors.push((slot, collector));
        self
    }

    /// Adds a voter. Its role decides the node it runs as.
    #[must_use]
    pub fn scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    /// Validates the configuration and assembles the graph.
    pub fn build(mut self) -> TribunalResult<Pipeline> {
        self.config.validate()?;
        let config = self.config;

        self.collectors.sort_by_key(|(slot, _)| *slot);
        self.scorers.sort_by_key(|s| s.role());

        let collector_ids: Vec<NodeId> = self.collectors.iter().map(|(slot, _)| slot.node_id()).collect();
        let scorer_nodes: Vec<ScorerNode> = self
            .scorers
            .into_iter()
            .map(|s| ScorerNode::new(s, config.score, config.runtime.scorer_timeout()))
            .collect();
        let scorer_ids: Vec<NodeId> = scorer_nodes.iter().map(ScorerNode::id).collect();

        let mut graph = Graph::builder()
            .entry(NodeId::Preflight)
            .node(NodeId::Preflight, Arc::new(PreflightNode::new(config.preflight.clone())));

        for (slot, collector) in self.collectors {
            graph = graph
                .node(
                    slot.node_id(),
                    Arc::new(CollectorNode::new(slot.node_id(), collector, config.runtime.collector_timeout())),
                )
                .edge(slot.node_id(), NodeId::EvidenceAggregator);
        }

        graph = graph.node(
            NodeId::EvidenceAggregator,
            Arc::new(node_fn(|state: &RunState, _out: &crate::graph::DeltaSink| {
                let failed = state
                    .errors
                    .iter()
                    .filter(|e| matches!(e.kind, ErrorKind::Collector | ErrorKind::Timeout | ErrorKind::Panic))
                    .count();
                tracing::info!(
                    dimensions = state.evidence.len(),
                    collector_errors = failed,
                    "evidence aggregated"
                );
                Ok(())
            })),
        );

        for node in scorer_nodes {
            let id = node.id();
            graph = graph.node(id, Arc::new(node)).edge(id, NodeId::ConsistencyCheck);
        }

        let mut preflight_targets: Vec<Target> = collector_ids.iter().copied().map(Target::Node).collect();
        preflight_targets.push(Target::Node(NodeId::EvidenceAggregator));
        preflight_targets.push(Target::End);

        let mut aggregator_targets: Vec<Target> = scorer_ids.iter().copied().map(Target::Node).collect();
        aggregator_targets.push(Target::Node(NodeId::ConsistencyCheck));
        let routed_scorers = scorer_ids.clone();

        let graph = graph
            .node(NodeId::ConsistencyCheck, Arc::new(ConsistencyNode::new(config.consistency.clone())))
            .node(
                NodeId::ChiefJustice,
                Arc::new(ChiefJusticeNode::new(Adjudicator::new(config.adjudication.clone(), config.score))),
            )
            .conditional(
                NodeId::Preflight,
                preflight_targets,
                collector_route(collector_ids, NodeId::EvidenceAggregator),
            )
            .conditional(NodeId::EvidenceAggregator, aggregator_targets, move |state: &RunState| {
                if state.evidence.is_empty() || routed_scorers.is_empty() {
                    tracing::debug!("no evidence to score; skipping voters");
                    return vec![Target::Node(NodeId::ConsistencyCheck)];
                }
                routed_scorers.iter().copied().map(Target::Node).collect()
            })
            .edge(NodeId::ConsistencyCheck, NodeId::ChiefJustice)
            .edge(NodeId::ChiefJustice, Target::End)
            .build()?;

        Ok(Pipeline {
            executor: Executor::new(graph),
            adjudicator: Adjudicator::new(config.adjudication.clone(), config.score),
            config,
        })
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The verdict. Always present.
    pub verdict: Verdict,
    /// Final run state, for auditing.
    pub state: RunState,
}

/// An assembled, reusable audit pipeline.
#[derive(Debug, Clone)]
pub struct Pipeline {
    executor: Executor,
    adjudicator: Adjudicator,
    config: TribunalConfig,
}

impl Pipeline {
    /// Starts a builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Configuration the pipeline was built with.
    #[must_use]
    pub const fn config(&self) -> &TribunalConfig {
        &self.config
    }

    /// The underlying graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        self.executor.graph()
    }

    /// Runs the pipeline for `input`. Always yields a verdict.
    ///
    /// A run stopped by pre-flight yields an invalid-configuration verdict
    /// with zero dimensions. If the adjudicator node itself failed, the
    /// verdict is synthesized from the final state instead.
    #[must_use]
    pub fn run(&self, input: RunInput) -> RunOutcome {
        tracing::info!(subject = %input.subject_url, documents = input.document_paths.len(), "run started");
        let state = self.executor.run(RunState::new(input));

        let verdict = match &state.verdict {
            Some(verdict) => verdict.clone(),
            None if state.errors.iter().any(|e| e.kind == ErrorKind::Configuration) => {
                tracing::warn!(errors = state.errors.len(), "run stopped by pre-flight validation");
                Verdict::invalid_configuration(
                    state.input.subject_url.clone(),
                    state.errors.clone(),
                    state.flags.clone(),
                )
            }
            None => {
                tracing::warn!("adjudicator produced no verdict; synthesizing from final state");
                self.adjudicator.synthesize(&state).verdict
            }
        };

        tracing::info!(overall = verdict.overall_score, passed = verdict.passed, "run finished");
        RunOutcome { verdict, state }
    }
}
