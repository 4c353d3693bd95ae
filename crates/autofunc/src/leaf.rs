//! Leaf nodes: variables and constants.

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::variable::VarId;
use std::rc::Rc;
use std::sync::Arc;

/// Graph leaf over a variable snapshot.
#[derive(Debug)]
pub(crate) struct Leaf {
    id: VarId,
    value: Arc<Vec<f64>>,
    leaves: LeafSet,
}

impl Leaf {
    pub(crate) fn new(id: VarId, value: Arc<Vec<f64>>) -> Self {
        Self {
            id,
            value,
            leaves: LeafSet::single(id),
        }
    }
}

impl Node for Leaf {
    fn output(&self) -> &[f64] {
        &self.value
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        grad.accumulate(self.id, upstream);
    }
}

/// Graph leaf over a variable snapshot with a tangent seed.
#[derive(Debug)]
pub(crate) struct RLeaf {
    id: VarId,
    value: Arc<Vec<f64>>,
    tangent: Vec<f64>,
    leaves: LeafSet,
}

impl RLeaf {
    pub(crate) fn new(id: VarId, value: Arc<Vec<f64>>, tangent: Vec<f64>) -> Self {
        Self {
            id,
            value,
            tangent,
            leaves: LeafSet::single(id),
        }
    }
}

impl RNode for RLeaf {
    fn output(&self) -> &[f64] {
        &self.value
    }

    fn r_output(&self) -> &[f64] {
        &self.tangent
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_r_gradient(
        &self,
        upstream: &mut [f64],
        upstream_r: &mut [f64],
        rgrad: &mut RGradient,
        grad: Option<&mut Gradient>,
    ) {
        if let Some(grad) = grad {
            grad.accumulate(self.id, upstream);
        }
        rgrad.accumulate(self.id, upstream_r);
    }
}

/// A value that no variable influences.
#[derive(Debug)]
struct Constant {
    value: Vec<f64>,
    tangent: Vec<f64>,
    leaves: LeafSet,
}

impl Node for Constant {
    fn output(&self) -> &[f64] {
        &self.value
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, _upstream: &mut [f64], _grad: &mut Gradient) {}
}

impl RNode for Constant {
    fn output(&self) -> &[f64] {
        &self.value
    }

    fn r_output(&self) -> &[f64] {
        &self.tangent
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_r_gradient(
        &self,
        _upstream: &mut [f64],
        _upstream_r: &mut [f64],
        _rgrad: &mut RGradient,
        _grad: Option<&mut Gradient>,
    ) {
    }
}

/// Constant node: always constant, never receives gradient.
///
/// # Example
///
/// ```
/// use autofunc::{Gradient, constant};
///
/// let c = constant(vec![1.0, 2.0]);
/// assert_eq!(c.output(), &[1.0, 2.0]);
/// assert!(c.constant(&Gradient::new()));
/// ```
pub fn constant(value: Vec<f64>) -> NodeRef {
    Rc::new(Constant {
        tangent: Vec::new(),
        value,
        leaves: LeafSet::empty(),
    })
}

/// Constant node with zero tangent.
pub fn constant_r(value: Vec<f64>) -> RNodeRef {
    Rc::new(Constant {
        tangent: vec![0.0; value.len()],
        value,
        leaves: LeafSet::empty(),
    })
}
