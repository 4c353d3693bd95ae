//! Pooling: checkpoint a node so its adjoint is collected once.
//!
//! `pool(ctx, x, f)` evaluates `f` on a synthetic leaf standing in for `x`.
//! During backward the synthetic leaf gathers every contribution from `f`'s
//! graph, and the total is pushed into `x` in a single call, however many
//! paths inside `f` read the leaf.
//!
//! ```text
//!   x ──► [PoolLeaf #p] ──► f(...) ──► result
//!          ▲                              │
//!          └── grad[#p] summed, then x.propagate_gradient(grad[#p]) once
//! ```

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::storage::Context;
use crate::variable::VarId;
use log::trace;
use std::rc::Rc;

/// Synthetic leaf reading through to its source's output.
#[derive(Debug)]
pub(crate) struct PoolLeaf {
    id: VarId,
    source: NodeRef,
    leaves: LeafSet,
}

impl PoolLeaf {
    pub(crate) fn new(source: &NodeRef) -> Self {
        let id = VarId::next();
        Self {
            id,
            source: Rc::clone(source),
            leaves: LeafSet::single(id),
        }
    }

    pub(crate) fn id(&self) -> VarId {
        self.id
    }
}

impl Node for PoolLeaf {
    fn output(&self) -> &[f64] {
        self.source.output()
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        grad.accumulate(self.id, upstream);
    }
}

#[derive(Debug)]
pub(crate) struct RPoolLeaf {
    id: VarId,
    source: RNodeRef,
    leaves: LeafSet,
}

impl RPoolLeaf {
    pub(crate) fn new(source: &RNodeRef) -> Self {
        let id = VarId::next();
        Self {
            id,
            source: Rc::clone(source),
            leaves: LeafSet::single(id),
        }
    }

    pub(crate) fn id(&self) -> VarId {
        self.id
    }
}

impl RNode for RPoolLeaf {
    fn output(&self) -> &[f64] {
        self.source.output()
    }

    fn r_output(&self) -> &[f64] {
        self.source.r_output()
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

/// Leaf set of a pooled result: each pool id is replaced by its input's set.
fn pooled_leaves<'a>(
    result: &LeafSet,
    pools: impl IntoIterator<Item = (VarId, &'a LeafSet)>,
) -> LeafSet {
    pools
        .into_iter()
        .fold(result.clone(), |acc, (id, input)| acc.substitute(id, input))
}

#[derive(Debug)]
struct Pooled {
    ctx: Context,
    pools: Vec<(VarId, NodeRef)>,
    result: NodeRef,
    leaves: LeafSet,
}

/// Evaluate `f` on a checkpoint of `input`.
///
/// The returned node has `f`'s output. Gradients flowing back from `f` into
/// the checkpoint are summed first and reach `input` through exactly one
/// backward call.
///
/// # Example
///
/// ```
/// use autofunc::{Context, Gradient, Variable, backward, ops, pool};
///
/// let ctx = Context::default();
/// let x = Variable::new(vec![3.0]);
/// let y = pool::pool(&ctx, &ops::square(&ctx, &x.node()), |p| {
///     ops::add(&ctx, p, &ops::mul(&ctx, p, p))
/// });
///
/// // y = x² + x⁴, dy/dx = 2x + 4x³
/// let mut grad = Gradient::for_vars([&x]);
/// backward(y.as_ref(), &[1.0], &mut grad);
/// assert_eq!(grad.get(x.id()).unwrap(), &[114.0]);
/// ```
pub fn pool(ctx: &Context, input: &NodeRef, f: impl FnOnce(&NodeRef) -> NodeRef) -> NodeRef {
    let leaf = PoolLeaf::new(input);
    let id = leaf.id;
    let leaf: NodeRef = Rc::new(leaf);
    let result = f(&leaf);
    pooled(ctx, vec![(id, Rc::clone(input))], result)
}

/// Evaluate `f` on checkpoints of every input.
pub fn pool_all(
    ctx: &Context,
    inputs: &[NodeRef],
    f: impl FnOnce(&[NodeRef]) -> NodeRef,
) -> NodeRef {
    let leaves: Vec<PoolLeaf> = inputs.iter().map(PoolLeaf::new).collect();
    let pools = leaves
        .iter()
        .zip(inputs)
        .map(|(leaf, input)| (leaf.id, Rc::clone(input)))
        .collect();
    let handles: Vec<NodeRef> = leaves
        .into_iter()
        .map(|leaf| Rc::new(leaf) as NodeRef)
        .collect();
    let result = f(&handles);
    pooled(ctx, pools, result)
}

fn pooled(ctx: &Context, pools: Vec<(VarId, NodeRef)>, result: NodeRef) -> NodeRef {
    let leaves = pooled_leaves(
        result.leaves(),
        pools.iter().map(|(id, input)| (*id, input.leaves())),
    );
    Rc::new(Pooled {
        ctx: ctx.clone(),
        pools,
        result,
        leaves,
    })
}

impl Node for Pooled {
    fn output(&self) -> &[f64] {
        self.result.output()
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let result_leaves = self.result.leaves();
        let live: Vec<&(VarId, NodeRef)> = self
            .pools
            .iter()
            .filter(|(id, input)| result_leaves.contains(*id) && !input.constant(grad))
            .collect();

        for (id, input) in &live {
            let zeros = self.ctx.alloc(input.output().len()).into_vec();
            grad.insert(*id, zeros);
        }
        if !self.result.constant(grad) {
            self.result.propagate_gradient(upstream, grad);
        }
        for (id, input) in live {
            let Some(mut adjoint) = grad.remove(*id) else {
                continue;
            };
            trace!("pool {id:?}: pushing collected adjoint into input");
            input.propagate_gradient(&mut adjoint, grad);
            self.ctx.recycle(adjoint);
        }
    }
}

#[derive(Debug)]
struct RPooled {
    ctx: Context,
    pools: Vec<(VarId, RNodeRef)>,
    result: RNodeRef,
    leaves: LeafSet,
}

/// R variant of [`pool`]: the checkpoint carries `input`'s tangent.
pub fn pool_r(
    ctx: &Context,
    input: &RNodeRef,
    f: impl FnOnce(&RNodeRef) -> RNodeRef,
) -> RNodeRef {
    let leaf = RPoolLeaf::new(input);
    let id = leaf.id;
    let leaf: RNodeRef = Rc::new(leaf);
    let result = f(&leaf);
    r_pooled(ctx, vec![(id, Rc::clone(input))], result)
}

/// R variant of [`pool_all`].
pub fn pool_all_r(
    ctx: &Context,
    inputs: &[RNodeRef],
    f: impl FnOnce(&[RNodeRef]) -> RNodeRef,
) -> RNodeRef {
    let leaves: Vec<RPoolLeaf> = inputs.iter().map(RPoolLeaf::new).collect();
    let pools = leaves
        .iter()
        .zip(inputs)
        .map(|(leaf, input)| (leaf.id, Rc::clone(input)))
        .collect();
    let handles: Vec<RNodeRef> = leaves
        .into_iter()
        .map(|leaf| Rc::new(leaf) as RNodeRef)
        .collect();
    let result = f(&handles);
    r_pooled(ctx, pools, result)
}

fn r_pooled(ctx: &Context, pools: Vec<(VarId, RNodeRef)>, result: RNodeRef) -> RNodeRef {
    let leaves = pooled_leaves(
        result.leaves(),
        pools.iter().map(|(id, input)| (*id, input.leaves())),
    );
    Rc::new(RPooled {
        ctx: ctx.clone(),
        pools,
        result,
        leaves,
    })
}

impl RNode for RPooled {
    fn output(&self) -> &[f64] {
        self.result.output()
    }

    fn r_output(&self) -> &[f64] {
        self.result.r_output()
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
        let result_leaves = self.result.leaves();
        let live: Vec<&(VarId, RNodeRef)> = self
            .pools
            .iter()
            .filter(|(id, input)| {
                result_leaves.contains(*id) && !input.constant(rgrad, grad.as_deref())
            })
            .collect();
        if live.is_empty() {
            if !self.result.constant(rgrad, grad.as_deref()) {
                self.result
                    .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
            }
            return;
        }

        // The pooled adjoint is needed even when the caller collects no
        // first-order gradient, so a local accumulator stands in for it.
        let had_grad = grad.is_some();
        let mut local = Gradient::new();
        let g: &mut Gradient = match grad {
            Some(g) => g,
            None => &mut local,
        };
        for (id, input) in &live {
            let len = input.output().len();
            g.insert(*id, self.ctx.alloc(len).into_vec());
            rgrad.insert(*id, self.ctx.alloc(len).into_vec());
        }
        self.result
            .propagate_r_gradient(upstream, upstream_r, rgrad, Some(&mut *g));
        for (id, input) in live {
            let (Some(mut adjoint), Some(mut adjoint_r)) = (g.remove(*id), rgrad.remove(*id))
            else {
                continue;
            };
            trace!("pool {id:?}: pushing collected adjoint and tangent into input");
            input.propagate_r_gradient(
                &mut adjoint,
                &mut adjoint_r,
                rgrad,
                had_grad.then_some(&mut *g),
            );
            self.ctx.recycle(adjoint);
            self.ctx.recycle(adjoint_r);
        }
    }
}
