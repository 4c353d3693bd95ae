//! Leaf parameters and their identities.

use crate::gradient::RVector;
use crate::leaf::{Leaf, RLeaf};
use crate::node::{NodeRef, RNodeRef};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identity of a leaf parameter.
///
/// Accumulators are keyed by `VarId` rather than by value or address. Ids come
/// from a process-wide counter and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u64);

impl VarId {
    /// Allocate a fresh id.
    pub fn next() -> Self {
        Self(NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw counter value.
    pub fn index(&self) -> u64 {
        self.0
    }
}

/// A differentiation variable: an owned vector with a stable identity.
///
/// Building a graph leaf from a variable snapshots its storage, so an
/// optimizer may keep mutating the variable while older graphs are alive;
/// writes after a snapshot copy the data first.
///
/// `Variable` is intentionally not `Clone`: a copy would share the identity
/// of the variable it was copied from.
///
/// # Example
///
/// ```
/// use autofunc::{Gradient, Variable};
///
/// let x = Variable::new(vec![1.0, 2.0]);
/// let grad = Gradient::for_vars([&x]);
/// assert_eq!(grad.get(x.id()), Some(&[0.0, 0.0][..]));
/// ```
#[derive(Debug)]
pub struct Variable {
    id: VarId,
    vector: Arc<Vec<f64>>,
}

impl Variable {
    /// Create a variable holding `vector`.
    pub fn new(vector: Vec<f64>) -> Self {
        Self {
            id: VarId::next(),
            vector: Arc::new(vector),
        }
    }

    /// Create a zero-filled variable.
    pub fn zeros(len: usize) -> Self {
        Self::new(vec![0.0; len])
    }

    /// Identity of this variable.
    pub fn id(&self) -> VarId {
        self.id
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.vector.len()
    }

    /// Check if the variable has no components.
    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }

    /// Current values.
    pub fn vector(&self) -> &[f64] {
        &self.vector
    }

    /// Mutable access to the values.
    ///
    /// Returns a slice so the length cannot change. If a live graph still
    /// holds a snapshot, the data is copied first.
    pub fn vector_mut(&mut self) -> &mut [f64] {
        Arc::make_mut(&mut self.vector).as_mut_slice()
    }

    /// Replace the values.
    ///
    /// # Panics
    ///
    /// Panics if `values` has a different length.
    pub fn set(&mut self, values: &[f64]) {
        assert_eq!(
            values.len(),
            self.len(),
            "Variable::set: expected {} values, got {}",
            self.len(),
            values.len()
        );
        self.vector_mut().copy_from_slice(values);
    }

    /// Leaf node over a snapshot of this variable.
    pub fn node(&self) -> NodeRef {
        Rc::new(Leaf::new(self.id, Arc::clone(&self.vector)))
    }

    /// Leaf node whose tangent is `rv`'s entry for this variable (zero if absent).
    ///
    /// # Panics
    ///
    /// Panics if the tangent entry has the wrong length.
    pub fn r_node(&self, rv: &RVector) -> RNodeRef {
        let tangent = match rv.get(self.id) {
            Some(t) => {
                assert_eq!(
                    t.len(),
                    self.len(),
                    "tangent for variable {:?} has length {}, expected {}",
                    self.id,
                    t.len(),
                    self.len()
                );
                t.to_vec()
            }
            None => vec![0.0; self.len()],
        };
        Rc::new(RLeaf::new(self.id, Arc::clone(&self.vector), tangent))
    }
}
