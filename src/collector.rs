//! Collector seam.
//!
//! A [`Collector`] inspects the subject and produces evidence. It sees only
//! the run input, never shared state. Collectors that need external
//! storage (a working copy, a scratch directory) hand out a [`Lease`] from
//! [`Collector::acquire`]; [`CollectorNode`] guarantees the matching
//! [`Collector::release`] runs exactly once, whether collection succeeds,
//! fails, panics or overruns its timeout.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NodeError;
use crate::evidence::Evidence;
use crate::graph::{DeltaSink, Node, NodeId};
use crate::state::{ErrorKind, RunError, RunInput, RunState};

/// Identifier of an acquired resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseId(Uuid);

impl LeaseId {
    /// Creates a new random lease ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LeaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// External storage held by a collector for the duration of one collection.
#[derive(Debug, PartialEq, Eq)]
pub struct Lease {
    id: LeaseId,
    location: PathBuf,
}

impl Lease {
    /// Creates a lease over `location`.
    #[must_use]
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            id: LeaseId::new(),
            location: location.into(),
        }
    }

    /// Lease identifier.
    #[must_use]
    pub const fn id(&self) -> LeaseId {
        self.id
    }

    /// Where the resource lives.
    #[must_use]
    pub fn location(&self) -> &Path {
        &self.location
    }
}

/// Write-only evidence output handed to a collector.
pub struct EvidenceSink<'a> {
    out: &'a DeltaSink,
    node: NodeId,
}

impl<'a> EvidenceSink<'a> {
    /// Wraps a node's delta sink.
    #[must_use]
    pub fn new(out: &'a DeltaSink, node: NodeId) -> Self {
        Self { out, node }
    }

    /// Records an evidence item. Items with invalid metadata are dropped and reported.
    pub fn push(&self, evidence: Evidence) {
        if let Err(err) = evidence.metadata.validate() {
            tracing::warn!(node = %self.node, dimension = %evidence.dimension_id, error = %err, "evidence rejected");
            self.out.push_error(RunError::new(
                Some(self.node),
                ErrorKind::Collector,
                format!("evidence for '{}' rejected: {err}", evidence.dimension_id),
            ));
            return;
        }
        self.out.push_evidence(evidence);
    }

    /// Number of items accepted so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.out.evidence_len()
    }

    /// True when nothing has been accepted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Produces evidence about the subject.
pub trait Collector: Send + Sync {
    /// Name used in logs and error records.
    fn name(&self) -> &str;

    /// Acquires external storage needed by [`Collector::collect`].
    fn acquire(&self, _input: &RunInput) -> Result<Option<Lease>, NodeError> {
        Ok(None)
    }

    /// Collects evidence. Items pushed before an error are kept.
    fn collect(&self, input: &RunInput, lease: Option<&Lease>, out: &EvidenceSink<'_>) -> Result<(), NodeError>;

    /// Releases a lease returned by [`Collector::acquire`].
    fn release(&self, _lease: Lease) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Releases the lease when dropped, including during unwinding.
struct LeaseGuard<'a> {
    collector: &'a dyn Collector,
    lease: Option<Lease>,
    out: &'a DeltaSink,
    node: NodeId,
}

impl LeaseGuard<'_> {
    fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        let Some(lease) = self.lease.take() else {
            return;
        };
        let id = lease.id();
        match self.collector.release(lease) {
            Ok(()) => tracing::debug!(node = %self.node, lease = %id, "lease released"),
            Err(err) => {
                tracing::warn!(node = %self.node, lease = %id, error = %err, "lease release failed");
                self.out.push_error(RunError::from_node_error(
                    self.node,
                    &NodeError::Lease {
                        lease: id.to_string(),
                        message: err.to_string(),
                    },
                ));
            }
        }
    }
}

/// Graph node running one collector under a timeout.
pub struct CollectorNode {
    id: NodeId,
    collector: Arc<dyn Collector>,
    timeout: Duration,
}

impl CollectorNode {
    /// Creates a collector node.
    #[must_use]
    pub fn new(id: NodeId, collector: Arc<dyn Collector>, timeout: Duration) -> Self {
        Self { id, collector, timeout }
    }
}

impl Node for CollectorNode {
    fn run(&self, state: &RunState, out: &DeltaSink) -> Result<(), NodeError> {
        let lease = self.collector.acquire(&state.input)?;
        let guard = LeaseGuard {
            collector: self.collector.as_ref(),
            lease,
            out,
            node: self.id,
        };

        let sink = EvidenceSink::new(out, self.id);
        let result = self.collector.collect(&state.input, guard.lease(), &sink);
        tracing::debug!(
            node = %self.id,
            collector = self.collector.name(),
            evidence = sink.len(),
            ok = result.is_ok(),
            "collection finished"
        );
        drop(guard);
        result
    }

    fn timeout(&self) -> Option<Duration> {
        Some(self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::evidence::EvidenceMetadata;

    #[derive(Default)]
    struct Counting {
        acquired: AtomicUsize,
        released: AtomicUsize,
        fail_release: bool,
    }

    impl Collector for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn acquire(&self, _input: &RunInput) -> Result<Option<Lease>, NodeError> {
            self.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Lease::new("/tmp/tribunal-test")))
        }

        fn collect(&self, _input: &RunInput, lease: Option<&Lease>, out: &EvidenceSink<'_>) -> Result<(), NodeError> {
            assert!(lease.is_some());
            out.push(Evidence::new("a", "counting", "scan", "x"));
            out.push(Evidence::new("b", "counting", "scan", "y").with_metadata(EvidenceMetadata {
                confidence: Some(2.0),
                ..EvidenceMetadata::default()
            }));
            Err(NodeError::collector("counting", "gave up"))
        }

        fn release(&self, _lease: Lease) -> Result<(), NodeError> {
            self.released.fetch_add(1, Ordering::SeqCst);
            if self.fail_release {
                return Err(NodeError::collector("counting", "rm failed"));
            }
            Ok(())
        }
    }

    fn run(collector: Arc<Counting>) -> (Result<(), NodeError>, crate::state::StateDelta) {
        let node = CollectorNode::new(NodeId::RepoInvestigator, collector, Duration::from_secs(1));
        let out = DeltaSink::new();
        let state = RunState::new(RunInput::new("https://x"));
        let result = node.run(&state, &out);
        (result, out.seal())
    }

    #[test]
    fn release_runs_once_on_error_path() {
        let collector = Arc::new(Counting::default());
        let (result, delta) = run(Arc::clone(&collector));
        assert!(result.is_err());
        assert_eq!(collector.acquired.load(Ordering::SeqCst), 1);
        assert_eq!(collector.released.load(Ordering::SeqCst), 1);
        assert_eq!(delta.evidence.len(), 1);
        // Invalid metadata is reported, not merged.
        assert_eq!(delta.errors.len(), 1);
    }

    #[test]
    fn release_failure_is_recorded() {
        let collector = Arc::new(Counting {
            fail_release: true,
            ..Counting::default()
        });
        let (_, delta) = run(collector);
        assert!(delta.errors.iter().any(|e| e.message.contains("rm failed")));
    }
}
