//! Staged graph executor.
//!
//! Execution proceeds in stages. A stage is every triggered node that no
//! other triggered node can still reach; its members run concurrently on
//! dedicated worker threads against one immutable state snapshot. The
//! stage ends at a barrier once every member has reported, faulted or
//! timed out. Deltas are then merged in registration order and the
//! members' outgoing edges are evaluated against the merged state.

use std::any::Any;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

use crate::error::NodeError;
use crate::graph::{Edge, Graph, NodeId, Target};
use crate::reducer;
use crate::state::{ErrorKind, RunError, RunState, StateDelta};

use super::node::DeltaSink;

/// Runs a [`Graph`] to completion.
#[derive(Debug, Clone)]
pub struct Executor {
    graph: Arc<Graph>,
}

struct InFlight {
    id: NodeId,
    sink: DeltaSink,
    timeout: Option<Duration>,
    rx: Receiver<Result<(), NodeError>>,
    handle: Option<JoinHandle<()>>,
}

impl Executor {
    /// Creates an executor for `graph`.
    #[must_use]
    pub fn new(graph: Graph) -> Self {
        Self {
            graph: Arc::new(graph),
        }
    }

    /// The graph being executed.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Executes the graph from its entry node and returns the final state.
    ///
    /// Node faults never abort the run: they are recorded in `errors` and
    /// the node's partial output is merged as usual.
    pub fn run(&self, mut state: RunState) -> RunState {
        let graph = &self.graph;
        let mut pending: BTreeSet<usize> = BTreeSet::new();
        let mut ran: HashSet<usize> = HashSet::new();
        if let Some(entry) = graph.rank(graph.entry()) {
            pending.insert(entry);
        }

        let mut stage = 0usize;
        while !pending.is_empty() {
            stage += 1;
            let ready: Vec<usize> = pending
                .iter()
                .copied()
                .filter(|&r| !pending.iter().any(|&p| p != r && graph.rank_reaches(p, r)))
                .collect();
            for r in &ready {
                pending.remove(r);
            }

            let ids: Vec<NodeId> = ready.iter().map(|&r| graph.handler(r).0).collect();
            tracing::info!(stage, nodes = ?ids, "stage started");
            let started = Instant::now();

            let deltas = self.run_stage(&ready, Arc::new(state.clone()));
            let merged = reducer::fold(deltas);
            if let Err(err) = state.apply(merged) {
                tracing::warn!(stage, nodes = ?ids, error = %err, "stage delta rejected");
            }
            ran.extend(ready.iter().copied());

            tracing::info!(
                stage,
                duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "stage finished"
            );

            let mut short_circuit = false;
            for &r in &ready {
                let (id, _) = graph.handler(r);
                for edge in graph.edges_from(id) {
                    for target in self.follow(edge, &mut state) {
                        match target {
                            Target::End => short_circuit = true,
                            Target::Node(next) => {
                                if let Some(rank) = graph.rank(next) {
                                    if !ran.contains(&rank) {
                                        pending.insert(rank);
                                    }
                                }
                            }
                        }
                    }
                }
            }

            if short_circuit {
                if !pending.is_empty() {
                    tracing::info!(stage, skipped = pending.len(), "routed to END; skipping remaining nodes");
                }
                pending.clear();
            }
        }

        state
    }

    /// Evaluates one edge against the merged state.
    fn follow(&self, edge: &Edge, state: &mut RunState) -> Vec<Target> {
        match edge {
            Edge::Static { to, .. } => vec![*to],
            Edge::Conditional { from, targets, route } => {
                let chosen = route(&*state);
                tracing::debug!(from = %from, chosen = ?chosen, "conditional edge evaluated");
                let (allowed, rejected): (Vec<Target>, Vec<Target>) =
                    chosen.into_iter().partition(|t| targets.contains(t));
                for target in rejected {
                    tracing::warn!(from = %from, target = %target, "route returned undeclared target");
                    let err = RunError::new(
                        Some(*from),
                        ErrorKind::Routing,
                        format!("route returned undeclared target '{target}'"),
                    );
                    if let Err(rejected) = state.apply(StateDelta::from_error(err)) {
                        tracing::warn!(error = %rejected, "routing error not recorded");
                    }
                }
                allowed
            }
        }
    }

    /// Runs every node of a stage concurrently and waits at the barrier.
    ///
    /// Returned deltas are in registration order.
    fn run_stage(&self, ready: &[usize], snapshot: Arc<RunState>) -> Vec<StateDelta> {
        let started = Instant::now();
        let in_flight: Vec<InFlight> = ready
            .iter()
            .map(|&rank| self.spawn(rank, Arc::clone(&snapshot)))
            .collect();

        in_flight
            .into_iter()
            .map(|flight| Self::await_node(flight, started))
            .collect()
    }

    fn spawn(&self, rank: usize, snapshot: Arc<RunState>) -> InFlight {
        let (id, node) = self.graph.handler(rank);
        let sink = DeltaSink::new();
        let timeout = node.timeout();
        let (tx, rx) = bounded::<Result<(), NodeError>>(1);

        let worker_sink = sink.clone();
        let spawned = thread::Builder::new()
            .name(format!("tribunal-{id}"))
            .spawn(move || {
                let result = node.run(&snapshot, &worker_sink);
                // The barrier may already have given up on this node.
                let _ = tx.send(result);
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(node = %id, error = %err, "failed to spawn node worker");
                sink.push_error(RunError::from_node_error(
                    id,
                    &NodeError::Panicked {
                        message: format!("failed to spawn worker: {err}"),
                    },
                ));
                None
            }
        };

        InFlight {
            id,
            sink,
            timeout,
            rx,
            handle,
        }
    }

    fn await_node(flight: InFlight, stage_started: Instant) -> StateDelta {
        let InFlight {
            id,
            sink,
            timeout,
            rx,
            handle,
        } = flight;

        if handle.is_none() {
            return sink.seal();
        }

        let outcome = match timeout {
            Some(limit) => {
                let remaining = limit.saturating_sub(stage_started.elapsed());
                match rx.recv_timeout(remaining) {
                    Ok(result) => Some(result),
                    Err(RecvTimeoutError::Timeout) => Some(Err(NodeError::Timeout {
                        duration_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    })),
                    Err(RecvTimeoutError::Disconnected) => None,
                }
            }
            None => rx.recv().ok(),
        };

        let result = match outcome {
            Some(result) => result,
            None => Err(NodeError::Panicked {
                message: handle.map_or_else(|| "worker vanished".to_string(), panic_message),
            }),
        };

        let mut delta = sink.seal();
        if let Err(err) = result {
            tracing::warn!(
                node = %id,
                error = %err,
                partial_evidence = delta.evidence.len(),
                partial_opinions = delta.opinions.len(),
                "node failed; merging partial output"
            );
            delta.errors.push(RunError::from_node_error(id, &err));
        }
        delta
    }
}

fn panic_message(handle: JoinHandle<()>) -> String {
    match handle.join() {
        Ok(()) => "worker exited without reporting".to_string(),
        Err(payload) => payload_text(payload.as_ref()),
    }
}

fn payload_text(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
