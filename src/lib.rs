//! # Tribunal - Staged Evidence Pipeline with Adjudicated Verdicts
//!
//! Tribunal runs a directed acyclic graph of independent analyzers over a
//! subject (a code repository plus accompanying documents), merges their
//! partial results at barriers without data races, lets a second layer of
//! independent voters score the merged evidence, and resolves the voters'
//! disagreement with fixed, auditable rules.
//!
//! ## Core Concepts
//!
//! - **Evidence**: a finding about one rubric dimension, produced by a [`Collector`]
//! - **Opinion**: a voter's score and rationale for one dimension, produced by a [`Scorer`]
//! - **Run state**: the container threaded through the graph; nodes read a
//!   snapshot and return a [`StateDelta`], merged by the [`reducer`] functions
//! - **Adjudicator**: fact supremacy, weighted voting, a security override and
//!   dissent detection, producing one [`CriterionResult`] per dimension
//! - **Verdict**: the terminal report, produced exactly once per run
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tribunal::{CollectorSlot, Pipeline, RunInput};
//!
//! let pipeline = Pipeline::builder()
//!     .collector(CollectorSlot::Repository, Arc::new(my_repo_collector))
//!     .scorer(Arc::new(my_prosecutor))
//!     .scorer(Arc::new(my_tech_lead))
//!     .build()?;
//!
//! let outcome = pipeline.run(RunInput::new("https://github.com/acme/agent"));
//! println!("{}", tribunal::report::render_text(&outcome.verdict, pipeline.config().score));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Record model
pub mod dimension;
pub mod error;
pub mod evidence;
pub mod opinion;
pub mod verdict;

// State and merging
pub mod reducer;
pub mod state;

// Engine
pub mod graph;

// Pipeline nodes
pub mod adjudicator;
pub mod collector;
pub mod consistency;
pub mod preflight;
pub mod scorer;

// Assembly and surfaces
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod replay;
pub mod report;

// Re-export primary types at crate root for convenience
pub use adjudicator::{Adjudicator, Resolution, Synthesis};
pub use collector::{Collector, CollectorNode, EvidenceSink, Lease, LeaseId};
pub use config::{LoadedConfig, TribunalConfig};
pub use dimension::DimensionId;
pub use error::{GraphError, NodeError, SynthesisError, TribunalError, TribunalResult, ValidationError};
pub use evidence::{Evidence, EvidenceMap, EvidenceMetadata};
pub use graph::{DeltaSink, Executor, Graph, GraphBuilder, Node, NodeId, Target};
pub use opinion::{Opinion, Overrule, ScoreRange, VoterRole};
pub use pipeline::{CollectorSlot, Pipeline, PipelineBuilder, RunOutcome};
pub use replay::Fixture;
pub use scorer::{OpinionSink, Scorer, ScorerNode};
pub use state::{ErrorKind, RunError, RunInput, RunState, StateDelta};
pub use verdict::{CriterionResult, Flag, FlagKind, RemediationItem, Verdict};
