//! Error types for Tribunal.
//!
//! All errors are strongly typed using thiserror. Fatal errors stop a run
//! before any collector executes; everything raised inside a node is
//! converted into a [`RunError`](crate::state::RunError) record and merged
//! into run state instead of being propagated.

use thiserror::Error;

use crate::graph::NodeId;

/// Validation errors for configuration and run input.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid subject URL '{url}': {reason}")]
    InvalidSubjectUrl {
        url: String,
        reason: String,
    },

    #[error("Unsupported document type for '{path}' (supported: {supported})")]
    UnsupportedDocument {
        path: String,
        supported: String,
    },

    #[error("Score range is empty: min {min} must be below max {max}")]
    EmptyScoreRange {
        min: u8,
        max: u8,
    },

    #[error("Threshold '{field}' = {value} lies outside the score range [{min}, {max}]")]
    ThresholdOutOfRange {
        field: String,
        value: f64,
        min: u8,
        max: u8,
    },

    #[error("Voter weight table has no non-zero weight")]
    NoVoterWeights,

    #[error("Field '{field}' must not be empty")]
    EmptyField {
        field: String,
    },

    #[error("Field '{field}' must be positive")]
    NotPositive {
        field: String,
    },

    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange {
        value: f32,
    },

    #[error("Malformed configuration: {reason}")]
    MalformedConfig {
        reason: String,
    },

    #[error("Malformed replay fixture: {reason}")]
    MalformedFixture {
        reason: String,
    },
}

/// Errors detected while assembling a pipeline graph.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Node '{node}' is registered twice")]
    DuplicateNode {
        node: NodeId,
    },

    #[error("Edge references unregistered node '{node}'")]
    UnknownNode {
        node: NodeId,
    },

    #[error("Graph has no entry node")]
    MissingEntry,

    #[error("Conditional edge from '{from}' declares no targets")]
    NoRouteTargets {
        from: NodeId,
    },

    #[error("Graph contains a cycle through '{node}'")]
    CycleDetected {
        node: NodeId,
    },
}

/// Faults raised inside a single node. These never abort a run.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("Collector '{collector}' failed: {message}")]
    Collector {
        collector: String,
        message: String,
    },

    #[error("Scorer '{scorer}' failed: {message}")]
    Scorer {
        scorer: String,
        message: String,
    },

    #[error("Node timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Node panicked: {message}")]
    Panicked {
        message: String,
    },

    #[error("Releasing lease {lease} failed: {message}")]
    Lease {
        lease: String,
        message: String,
    },
}

impl NodeError {
    /// Creates a collector fault.
    #[must_use]
    pub fn collector(collector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Collector {
            collector: collector.into(),
            message: message.into(),
        }
    }

    /// Creates a scorer fault.
    #[must_use]
    pub fn scorer(scorer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Scorer {
            scorer: scorer.into(),
            message: message.into(),
        }
    }
}

/// Anomalies found while synthesizing a criterion result.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("Dimension '{dimension}' has {opinions} opinions but none from a weighted voter role")]
    NoRecognizedVoters {
        dimension: String,
        opinions: usize,
    },
}

/// Top-level error type for Tribunal.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum TribunalError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl TribunalError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an I/O error bound to a path.
    #[must_use]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this error prevents a run from producing a verdict.
    ///
    /// Node and synthesis errors are contained inside the run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Node(_) | Self::Synthesis(_))
    }
}

/// Result type alias for Tribunal operations.
pub type TribunalResult<T> = Result<T, TribunalError>;
