//! Sets of leaf identities reachable from a node.

use crate::gradient::Gradient;
use crate::variable::VarId;
use smallvec::SmallVec;

/// Sorted set of the [`VarId`]s a node depends on.
///
/// Every node computes its set once at construction from its inputs' sets.
/// A node is constant with respect to an accumulator exactly when its set
/// shares no id with the accumulator, and backward passes only descend into
/// inputs that are not constant, so pruning and traversal agree by
/// construction.
///
/// Uses `SmallVec<[VarId; 4]>`: most nodes depend on a handful of parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafSet {
    ids: SmallVec<[VarId; 4]>,
}

impl LeafSet {
    /// The empty set (a constant node).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set containing a single id.
    pub fn single(id: VarId) -> Self {
        let mut ids = SmallVec::new();
        ids.push(id);
        Self { ids }
    }

    /// Number of ids.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Check if no leaf is reachable.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Check membership.
    pub fn contains(&self, id: VarId) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// Iterate over ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = VarId> + '_ {
        self.ids.iter().copied()
    }

    /// Union of two sets.
    pub fn union(&self, other: &LeafSet) -> LeafSet {
        if other.ids.is_empty() || self.ids == other.ids {
            return self.clone();
        }
        if self.ids.is_empty() {
            return other.clone();
        }
        let mut ids = SmallVec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < other.ids.len() {
            let (a, b) = (self.ids[i], other.ids[j]);
            if a < b {
                ids.push(a);
                i += 1;
            } else if b < a {
                ids.push(b);
                j += 1;
            } else {
                ids.push(a);
                i += 1;
                j += 1;
            }
        }
        ids.extend_from_slice(&self.ids[i..]);
        ids.extend_from_slice(&other.ids[j..]);
        LeafSet { ids }
    }

    /// Union of any number of sets.
    pub fn union_all<'a>(sets: impl IntoIterator<Item = &'a LeafSet>) -> LeafSet {
        sets.into_iter()
            .fold(LeafSet::empty(), |acc, set| acc.union(set))
    }

    /// This set with `id` removed.
    pub fn without(&self, id: VarId) -> LeafSet {
        let mut ids = self.ids.clone();
        if let Ok(pos) = ids.binary_search(&id) {
            ids.remove(pos);
        }
        LeafSet { ids }
    }

    /// Replace a synthetic leaf by the set of the input it stands for.
    ///
    /// If `id` is not reachable, the input contributes nothing.
    pub fn substitute(&self, id: VarId, replacement: &LeafSet) -> LeafSet {
        if self.contains(id) {
            self.without(id).union(replacement)
        } else {
            self.clone()
        }
    }

    /// Check whether any id has an entry in `grad`.
    pub fn intersects(&self, grad: &Gradient) -> bool {
        if self.ids.len() <= grad.len() {
            self.ids.iter().any(|&id| grad.contains(id))
        } else {
            grad.ids().any(|id| self.contains(id))
        }
    }
}
