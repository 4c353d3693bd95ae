//! Identity-keyed accumulators and tangent directions.

use crate::variable::{VarId, Variable};
use std::collections::HashMap;

/// Container for accumulated partial derivatives.
///
/// Stores one vector per tracked variable, keyed by [`VarId`]. Only variables
/// with an entry receive gradient during a backward pass; contributions that
/// reach the same variable along several paths are summed in place.
///
/// The same container serves as the R-gradient accumulator (see [`RGradient`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradient {
    entries: HashMap<VarId, Vec<f64>>,
}

/// Accumulator for the directional derivative of a gradient.
pub type RGradient = Gradient;

impl Gradient {
    /// Create an empty gradient container.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a container with a zeroed entry for each variable.
    pub fn for_vars<'a>(vars: impl IntoIterator<Item = &'a Variable>) -> Self {
        let mut grad = Self::new();
        for var in vars {
            grad.track(var);
        }
        grad
    }

    /// Add a zeroed entry for `var`, replacing any existing one.
    pub fn track(&mut self, var: &Variable) {
        self.entries.insert(var.id(), vec![0.0; var.len()]);
    }

    /// Insert an entry directly.
    pub fn insert(&mut self, id: VarId, grad: Vec<f64>) -> Option<Vec<f64>> {
        self.entries.insert(id, grad)
    }

    /// Remove and return an entry.
    pub fn remove(&mut self, id: VarId) -> Option<Vec<f64>> {
        self.entries.remove(&id)
    }

    /// Get the gradient for a variable.
    pub fn get(&self, id: VarId) -> Option<&[f64]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    /// Get the gradient for a variable mutably.
    pub fn get_mut(&mut self, id: VarId) -> Option<&mut [f64]> {
        self.entries.get_mut(&id).map(Vec::as_mut_slice)
    }

    /// Check if a variable is tracked.
    pub fn contains(&self, id: VarId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of tracked variables.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over tracked ids.
    pub fn ids(&self) -> impl Iterator<Item = VarId> + '_ {
        self.entries.keys().copied()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &[f64])> {
        self.entries.iter().map(|(&id, g)| (id, g.as_slice()))
    }

    /// Add `contribution` into the entry for `id`, if tracked.
    ///
    /// Returns whether an entry existed.
    ///
    /// # Panics
    ///
    /// Panics if the entry and the contribution differ in length.
    pub fn accumulate(&mut self, id: VarId, contribution: &[f64]) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        assert_eq!(
            entry.len(),
            contribution.len(),
            "gradient for {id:?} has length {}, contribution has length {}",
            entry.len(),
            contribution.len()
        );
        for (g, &c) in entry.iter_mut().zip(contribution) {
            *g += c;
        }
        true
    }

    /// Reset every entry to zero, keeping the tracked set.
    pub fn zero(&mut self) {
        for entry in self.entries.values_mut() {
            entry.fill(0.0);
        }
    }

    /// Multiply every entry by `s`.
    pub fn scale(&mut self, s: f64) {
        for entry in self.entries.values_mut() {
            for g in entry.iter_mut() {
                *g *= s;
            }
        }
    }

    /// Add the entries of `other` that this container also tracks.
    pub fn add(&mut self, other: &Gradient) {
        for (id, g) in other.iter() {
            self.accumulate(id, g);
        }
    }

    /// Add `scale` times each entry into the matching variable.
    ///
    /// With a negative `scale` this is a plain gradient-descent step.
    pub fn add_to_vars<'a>(&self, vars: impl IntoIterator<Item = &'a mut Variable>, scale: f64) {
        for var in vars {
            if let Some(g) = self.get(var.id()) {
                for (v, &d) in var.vector_mut().iter_mut().zip(g) {
                    *v += scale * d;
                }
            }
        }
    }
}

/// Tangent direction: perturbation seeds for a set of variables.
///
/// Variables without an entry have zero tangent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RVector {
    entries: HashMap<VarId, Vec<f64>>,
}

impl RVector {
    /// Create an empty direction (all tangents zero).
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Set the tangent for a variable.
    pub fn insert(&mut self, id: VarId, tangent: Vec<f64>) -> Option<Vec<f64>> {
        self.entries.insert(id, tangent)
    }

    /// Remove the tangent for a variable.
    pub fn remove(&mut self, id: VarId) -> Option<Vec<f64>> {
        self.entries.remove(&id)
    }

    /// Get the tangent for a variable.
    pub fn get(&self, id: VarId) -> Option<&[f64]> {
        self.entries.get(&id).map(Vec::as_slice)
    }

    /// Check if a variable has a tangent.
    pub fn contains(&self, id: VarId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Number of variables with a tangent.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if every tangent is zero by omission.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<&Gradient> for RVector {
    /// Use a gradient as a perturbation direction.
    fn from(grad: &Gradient) -> Self {
        Self {
            entries: grad.entries.clone(),
        }
    }
}
