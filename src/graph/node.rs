//! Node handler trait and the per-node output sink.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::NodeError;
use crate::evidence::Evidence;
use crate::opinion::Opinion;
use crate::state::{RunError, RunState, StateDelta};
use crate::verdict::{Flag, Verdict};

/// A unit of work in the pipeline graph.
///
/// A node reads an immutable snapshot of run state and writes its partial
/// output into `out`. Returning `Err` records the fault but keeps whatever
/// was already written to `out`.
pub trait Node: Send + Sync {
    /// Executes the node.
    fn run(&self, state: &RunState, out: &DeltaSink) -> Result<(), NodeError>;

    /// Upper bound on run time. Nodes performing external I/O must set one.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Node backed by a closure.
pub struct FnNode<F> {
    f: F,
    timeout: Option<Duration>,
}

impl<F> FnNode<F> {
    /// Sets a timeout for the closure.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Wraps a closure as a node.
pub fn node_fn<F>(f: F) -> FnNode<F>
where
    F: Fn(&RunState, &DeltaSink) -> Result<(), NodeError> + Send + Sync,
{
    FnNode { f, timeout: None }
}

impl<F> Node for FnNode<F>
where
    F: Fn(&RunState, &DeltaSink) -> Result<(), NodeError> + Send + Sync,
{
    fn run(&self, state: &RunState, out: &DeltaSink) -> Result<(), NodeError> {
        (self.f)(state, out)
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[derive(Debug, Default)]
struct SinkInner {
    delta: StateDelta,
    sealed: bool,
}

/// Accumulates one node's partial output.
///
/// The executor seals the sink when the node finishes, faults or times out.
/// Writes arriving after sealing (from a node still running past its
/// timeout) are dropped.
#[derive(Debug, Clone, Default)]
pub struct DeltaSink {
    inner: Arc<Mutex<SinkInner>>,
}

impl DeltaSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, f: impl FnOnce(&mut StateDelta)) {
        let mut inner = self.lock();
        if inner.sealed {
            tracing::debug!("write to sealed delta sink dropped");
            return;
        }
        f(&mut inner.delta);
    }

    /// Records an evidence item.
    pub fn push_evidence(&self, evidence: Evidence) {
        self.write(|d| d.evidence.push(evidence));
    }

    /// Records an opinion.
    pub fn push_opinion(&self, opinion: Opinion) {
        self.write(|d| d.opinions.push(opinion));
    }

    /// Records a non-fatal error.
    pub fn push_error(&self, error: RunError) {
        self.write(|d| d.errors.push(error));
    }

    /// Raises a flag.
    pub fn push_flag(&self, flag: Flag) {
        self.write(|d| d.flags.push(flag));
    }

    /// Writes the terminal verdict.
    pub fn set_verdict(&self, verdict: Verdict) {
        self.write(|d| d.verdict = Some(verdict));
    }

    /// Number of evidence items recorded so far.
    #[must_use]
    pub fn evidence_len(&self) -> usize {
        self.lock().delta.evidence.len()
    }

    /// True once the executor has taken the output.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.lock().sealed
    }

    /// Seals the sink and takes its content.
    pub fn seal(&self) -> StateDelta {
        let mut inner = self.lock();
        inner.sealed = true;
        std::mem::take(&mut inner.delta)
    }
}
