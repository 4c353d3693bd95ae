//! The node protocol shared by every differentiable operation.
//!
//! Two parallel capability sets exist: [`Node`] for value-only graphs and
//! [`RNode`] for graphs that also carry a forward tangent (the R-operator).
//!
//! ```text
//!   Variable ──node()──► Leaf ─┐
//!                              ├──► Sum ──► Product ──► ... (Rc<dyn Node>)
//!   Variable ──node()──► Leaf ─┘
//!
//!   backward: upstream ──► Product ──► Sum ──► Leaf ──► Gradient[VarId] += ...
//! ```
//!
//! Any type implementing these traits composes with the rest of the crate;
//! there is no registration step.

use crate::gradient::{Gradient, RGradient, RVector};
use crate::leaf_set::LeafSet;
use crate::storage::Context;
use std::fmt::Debug;
use std::rc::Rc;

/// A value-only node in the computation graph.
pub trait Node: Debug {
    /// Forward value, fixed at construction.
    fn output(&self) -> &[f64];

    /// Leaves this node's output depends on.
    fn leaves(&self) -> &LeafSet;

    /// Check whether no reachable leaf is tracked by `grad`.
    fn constant(&self, grad: &Gradient) -> bool {
        !self.leaves().intersects(grad)
    }

    /// Push the adjoint `upstream` of this node's output to its non-constant
    /// inputs, accumulating into `grad` at the leaves.
    ///
    /// `upstream` is loaned: the callee may overwrite it and must not keep it.
    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient);
}

/// A node carrying a forward tangent alongside its value.
pub trait RNode: Debug {
    /// Forward value, fixed at construction.
    fn output(&self) -> &[f64];

    /// Directional derivative of the output.
    fn r_output(&self) -> &[f64];

    /// Leaves this node's output depends on.
    fn leaves(&self) -> &LeafSet;

    /// Check whether no reachable leaf is tracked by `rgrad` or `grad`.
    fn constant(&self, rgrad: &RGradient, grad: Option<&Gradient>) -> bool {
        !self.leaves().intersects(rgrad) && grad.is_none_or(|g| !self.leaves().intersects(g))
    }

    /// Push the adjoint and its tangent to non-constant inputs.
    ///
    /// `rgrad` collects the tangent of the gradient; `grad`, when present,
    /// collects the gradient itself. Both upstream slices are loaned.
    fn propagate_r_gradient(
        &self,
        upstream: &mut [f64],
        upstream_r: &mut [f64],
        rgrad: &mut RGradient,
        grad: Option<&mut Gradient>,
    );
}

/// Shared handle to a value-only node.
pub type NodeRef = Rc<dyn Node>;

/// Shared handle to a value+tangent node.
pub type RNodeRef = Rc<dyn RNode>;

/// A reusable differentiable function.
pub trait Func {
    fn apply(&self, ctx: &Context, input: &NodeRef) -> NodeRef;
}

/// A reusable differentiable function with R-operator support.
///
/// `rv` supplies tangents for any variables the function owns.
pub trait RFunc {
    fn apply_r(&self, ctx: &Context, rv: &RVector, input: &RNodeRef) -> RNodeRef;
}

/// Explicitly release a node handle.
///
/// Output buffers return to their cache once the last handle to a node is
/// gone; inputs shared with other live nodes stay alive. Releasing is the
/// same as dropping and may happen any number of times across handles.
pub fn release<N: ?Sized>(node: Rc<N>) {
    drop(node);
}

pub(crate) fn assert_same_len(op: &str, a: usize, b: usize) {
    assert_eq!(a, b, "{op}: input lengths differ ({a} vs {b})");
}

/// Send `upstream` to both inputs of a node whose partials are the identity
/// for each, copying only when both need it.
pub(crate) fn propagate_to_both(
    ctx: &Context,
    a: &NodeRef,
    b: &NodeRef,
    upstream: &mut [f64],
    grad: &mut Gradient,
) {
    let a_live = !a.constant(grad);
    let b_live = !b.constant(grad);
    if a_live && b_live {
        let mut copy = ctx.copy_of(upstream);
        a.propagate_gradient(&mut copy, grad);
        b.propagate_gradient(upstream, grad);
    } else if a_live {
        a.propagate_gradient(upstream, grad);
    } else if b_live {
        b.propagate_gradient(upstream, grad);
    }
}

pub(crate) fn propagate_r_to_both(
    ctx: &Context,
    a: &RNodeRef,
    b: &RNodeRef,
    upstream: &mut [f64],
    upstream_r: &mut [f64],
    rgrad: &mut RGradient,
    mut grad: Option<&mut Gradient>,
) {
    let a_live = !a.constant(rgrad, grad.as_deref());
    let b_live = !b.constant(rgrad, grad.as_deref());
    if a_live && b_live {
        let mut copy = ctx.copy_of(upstream);
        let mut copy_r = ctx.copy_of(upstream_r);
        a.propagate_r_gradient(&mut copy, &mut copy_r, rgrad, grad.as_deref_mut());
        b.propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    } else if a_live {
        a.propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    } else if b_live {
        b.propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    }
}
