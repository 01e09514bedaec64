//! Field reducers for merging partial state.
//!
//! All reducers are pure and associative. The keyed override-union is not
//! commutative: on a key collision the right-hand input wins. The executor
//! always feeds deltas in node-registration order, so the later-registered
//! branch wins regardless of which thread finished first.

use crate::evidence::{Evidence, EvidenceMap};
use crate::state::StateDelta;

/// Collapses one branch's evidence into a map; later records for a dimension win.
#[must_use]
pub fn collapse_evidence(records: Vec<Evidence>) -> EvidenceMap {
    let mut map = EvidenceMap::new();
    for record in records {
        map.insert(record.dimension_id.clone(), record);
    }
    map
}

/// Keyed override-union: the union of keys, `right` wins on collision.
#[must_use]
pub fn override_union(mut left: EvidenceMap, right: EvidenceMap) -> EvidenceMap {
    for (dimension, incoming) in right {
        if let Some(previous) = left.get(&dimension) {
            if previous != &incoming {
                tracing::warn!(
                    dimension = %dimension,
                    replaced = %previous.source,
                    winner = %incoming.source,
                    "evidence key collision; later-registered branch wins"
                );
            }
        }
        left.insert(dimension, incoming);
    }
    left
}

/// Append reducer for list fields.
pub fn append<T>(into: &mut Vec<T>, items: Vec<T>) {
    into.extend(items);
}

/// Combines two deltas so that `combine(a, b)` merged once equals merging `a` then `b`.
#[must_use]
pub fn combine(mut left: StateDelta, right: StateDelta) -> StateDelta {
    append(&mut left.evidence, right.evidence);
    append(&mut left.opinions, right.opinions);
    append(&mut left.errors, right.errors);
    append(&mut left.flags, right.flags);
    left.verdict = right.verdict.or(left.verdict);
    left
}

/// Folds deltas in the given order.
#[must_use]
pub fn fold<I>(deltas: I) -> StateDelta
where
    I: IntoIterator<Item = StateDelta>,
{
    deltas.into_iter().fold(StateDelta::default(), combine)
}
