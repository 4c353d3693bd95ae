//! Sequential fold: `state ← step(state, xᵢ)` with the state checkpointed at
//! every boundary.
//!
//! Each step sees the previous state through a pool leaf, so the backward
//! pass runs once per step in reverse order and the cost stays linear in the
//! sequence length:
//!
//! ```text
//!   s₀ ──► [p₁] ─step(·, x₁)─► s₁ ──► [p₂] ─step(·, x₂)─► s₂ ──► ...
//!   backward:  ū ──► step₂ ──► grad[p₂] ──► step₁ ──► grad[p₁] ──► s₀
//! ```

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::pool::{PoolLeaf, RPoolLeaf};
use crate::storage::Context;
use crate::variable::VarId;
use log::debug;
use std::rc::Rc;

/// One boundary of a fold.
#[derive(Debug)]
struct Step<N: ?Sized> {
    /// Pool leaf standing for the state entering this step.
    pool: VarId,
    result: Rc<N>,
    /// Leaves the state after this step depends on, pool ids resolved.
    reach: LeafSet,
}

#[derive(Debug)]
struct Fold {
    ctx: Context,
    initial: NodeRef,
    steps: Vec<Step<dyn Node>>,
}

/// Fold `step` over `inputs` starting from `initial`.
///
/// With no inputs the result is `initial`'s value.
///
/// # Example
///
/// ```
/// use autofunc::{Context, Variable, fold, ops};
///
/// let ctx = Context::default();
/// let start = Variable::new(vec![2.0, 1.0]);
/// let xs = [vec![1.0, 2.0], vec![2.5, 1.5], vec![3.0, 0.5]]
///     .map(|v| Variable::new(v).node());
///
/// let out = fold::fold(&ctx, &start.node(), &xs, |state, x| {
///     ops::mul(&ctx, &ops::inverse(&ctx, state), x)
/// });
/// assert!((out.output()[0] - 0.6).abs() < 1e-12);
/// assert!((out.output()[1] - 2.0 / 3.0).abs() < 1e-12);
/// ```
pub fn fold(
    ctx: &Context,
    initial: &NodeRef,
    inputs: &[NodeRef],
    mut step: impl FnMut(&NodeRef, &NodeRef) -> NodeRef,
) -> NodeRef {
    let mut steps: Vec<Step<dyn Node>> = Vec::with_capacity(inputs.len());
    let mut state = Rc::clone(initial);
    let mut reach = initial.leaves().clone();
    for input in inputs {
        let leaf = PoolLeaf::new(&state);
        let pool = leaf.id();
        let leaf: NodeRef = Rc::new(leaf);
        let result = step(&leaf, input);
        reach = result.leaves().substitute(pool, &reach);
        state = Rc::clone(&result);
        steps.push(Step {
            pool,
            result,
            reach: reach.clone(),
        });
    }
    Rc::new(Fold {
        ctx: ctx.clone(),
        initial: Rc::clone(initial),
        steps,
    })
}

impl Fold {
    fn state_before(&self, i: usize) -> (&[f64], &LeafSet) {
        match i {
            0 => (self.initial.output(), self.initial.leaves()),
            _ => (self.steps[i - 1].result.output(), &self.steps[i - 1].reach),
        }
    }
}

// Each step's pool leaf holds the previous result, so dropping the steps
// front to back would recurse once per step. Popping keeps the depth flat.
impl Drop for Fold {
    fn drop(&mut self) {
        while let Some(step) = self.steps.pop() {
            drop(step);
        }
    }
}

impl Node for Fold {
    fn output(&self) -> &[f64] {
        match self.steps.last() {
            Some(step) => step.result.output(),
            None => self.initial.output(),
        }
    }

    fn leaves(&self) -> &LeafSet {
        match self.steps.last() {
            Some(step) => &step.reach,
            None => self.initial.leaves(),
        }
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        debug!("fold: backward over {} steps", self.steps.len());
        let mut carried: Option<Vec<f64>> = None;
        for (i, step) in self.steps.iter().enumerate().rev() {
            if !step.reach.intersects(grad) {
                return;
            }
            let (prev_output, prev_reach) = self.state_before(i);
            let prev_live = step.result.leaves().contains(step.pool) && prev_reach.intersects(grad);
            if prev_live {
                grad.insert(step.pool, self.ctx.alloc(prev_output.len()).into_vec());
            }

            let adjoint = match carried.as_mut() {
                Some(c) => c.as_mut_slice(),
                None => &mut *upstream,
            };
            if !step.result.constant(grad) {
                step.result.propagate_gradient(adjoint, grad);
            }
            if let Some(old) = carried.take() {
                self.ctx.recycle(old);
            }
            if !prev_live {
                return;
            }
            carried = grad.remove(step.pool);
            if carried.is_none() {
                return;
            }
        }

        if self.steps.is_empty() {
            self.initial.propagate_gradient(upstream, grad);
        } else if let Some(mut adjoint) = carried {
            self.initial.propagate_gradient(&mut adjoint, grad);
            self.ctx.recycle(adjoint);
        }
    }
}

#[derive(Debug)]
struct RFold {
    ctx: Context,
    initial: RNodeRef,
    steps: Vec<Step<dyn RNode>>,
}

/// R variant of [`fold`]; the state carries its tangent across steps.
pub fn fold_r(
    ctx: &Context,
    initial: &RNodeRef,
    inputs: &[RNodeRef],
    mut step: impl FnMut(&RNodeRef, &RNodeRef) -> RNodeRef,
) -> RNodeRef {
    let mut steps: Vec<Step<dyn RNode>> = Vec::with_capacity(inputs.len());
    let mut state = Rc::clone(initial);
    let mut reach = initial.leaves().clone();
    for input in inputs {
        let leaf = RPoolLeaf::new(&state);
        let pool = leaf.id();
        let leaf: RNodeRef = Rc::new(leaf);
        let result = step(&leaf, input);
        reach = result.leaves().substitute(pool, &reach);
        state = Rc::clone(&result);
        steps.push(Step {
            pool,
            result,
            reach: reach.clone(),
        });
    }
    Rc::new(RFold {
        ctx: ctx.clone(),
        initial: Rc::clone(initial),
        steps,
    })
}

impl RFold {
    fn state_before(&self, i: usize) -> (&[f64], &LeafSet) {
        match i {
            0 => (self.initial.output(), self.initial.leaves()),
            _ => (self.steps[i - 1].result.output(), &self.steps[i - 1].reach),
        }
    }
}

fn tracked(set: &LeafSet, rgrad: &RGradient, grad: &Gradient) -> bool {
    set.intersects(rgrad) || set.intersects(grad)
}

impl Drop for RFold {
    fn drop(&mut self) {
        while let Some(step) = self.steps.pop() {
            drop(step);
        }
    }
}

impl RNode for RFold {
    fn output(&self) -> &[f64] {
        match self.steps.last() {
            Some(step) => step.result.output(),
            None => self.initial.output(),
        }
    }

    fn r_output(&self) -> &[f64] {
        match self.steps.last() {
            Some(step) => step.result.r_output(),
            None => self.initial.r_output(),
        }
    }

    fn leaves(&self) -> &LeafSet {
        match self.steps.last() {
            Some(step) => &step.reach,
            None => self.initial.leaves(),
        }
    }

    fn propagate_r_gradient(
        &self,
        upstream: &mut [f64],
        upstream_r: &mut [f64],
        rgrad: &mut RGradient,
        grad: Option<&mut Gradient>,
    ) {
        debug!("fold_r: backward over {} steps", self.steps.len());
        if self.steps.is_empty() {
            self.initial
                .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
            return;
        }

        // Pool adjoints are collected even when the caller wants no
        // first-order gradient.
        let had_grad = grad.is_some();
        let mut local = Gradient::new();
        let g: &mut Gradient = match grad {
            Some(g) => g,
            None => &mut local,
        };
        let mut carried: Option<(Vec<f64>, Vec<f64>)> = None;
        for (i, step) in self.steps.iter().enumerate().rev() {
            if !tracked(&step.reach, rgrad, g) {
                return;
            }
            let (prev_output, prev_reach) = self.state_before(i);
            let prev_live =
                step.result.leaves().contains(step.pool) && tracked(prev_reach, rgrad, g);
            if prev_live {
                let len = prev_output.len();
                g.insert(step.pool, self.ctx.alloc(len).into_vec());
                rgrad.insert(step.pool, self.ctx.alloc(len).into_vec());
            }

            let (adjoint, adjoint_r) = match carried.as_mut() {
                Some((c, c_r)) => (c.as_mut_slice(), c_r.as_mut_slice()),
                None => (&mut *upstream, &mut *upstream_r),
            };
            if !step.result.constant(rgrad, Some(&*g)) {
                step.result
                    .propagate_r_gradient(adjoint, adjoint_r, rgrad, Some(&mut *g));
            }
            if let Some((old, old_r)) = carried.take() {
                self.ctx.recycle(old);
                self.ctx.recycle(old_r);
            }
            if !prev_live {
                return;
            }
            match (g.remove(step.pool), rgrad.remove(step.pool)) {
                (Some(a), Some(a_r)) => carried = Some((a, a_r)),
                _ => return,
            }
        }

        if let Some((mut adjoint, mut adjoint_r)) = carried {
            self.initial.propagate_r_gradient(
                &mut adjoint,
                &mut adjoint_r,
                rgrad,
                had_grad.then_some(g),
            );
            self.ctx.recycle(adjoint);
            self.ctx.recycle(adjoint_r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::{backward, backward_r};
    use crate::gradient::RVector;
    use crate::leaf::{constant, constant_r};
    use crate::ops;
    use crate::variable::Variable;
    use approx::assert_relative_eq;

    fn inputs() -> Vec<Variable> {
        [vec![1.0, 2.0], vec![2.5, 1.5], vec![3.0, 0.5]]
            .into_iter()
            .map(Variable::new)
            .collect()
    }

    #[test]
    fn test_fold_reciprocal_scenario() {
        let ctx = Context::default();
        let start = Variable::new(vec![2.0, 1.0]);
        let xs = inputs();
        let nodes: Vec<NodeRef> = xs.iter().map(Variable::node).collect();
        let out = fold(&ctx, &start.node(), &nodes, |s, x| {
            ops::mul(&ctx, &ops::inverse(&ctx, s), x)
        });
        assert_relative_eq!(out.output()[0], 0.6, epsilon = 1e-12);
        assert_relative_eq!(out.output()[1], 2.0 / 3.0, epsilon = 1e-12);

        // Unrolled: out = x₃ x₁ / (x₂ s₀) componentwise.
        let mut grad = Gradient::for_vars([&start, &xs[0]]);
        backward(out.as_ref(), &[1.0, 1.0], &mut grad);
        let gs = grad.get(start.id()).unwrap();
        assert_relative_eq!(gs[0], -3.0 * 1.0 / (2.5 * 4.0), epsilon = 1e-12);
        assert_relative_eq!(gs[1], -0.5 * 2.0 / (1.5 * 1.0), epsilon = 1e-12);
        let gx = grad.get(xs[0].id()).unwrap();
        assert_relative_eq!(gx[0], 3.0 / (2.5 * 2.0), epsilon = 1e-12);
        assert_relative_eq!(gx[1], 0.5 / (1.5 * 1.0), epsilon = 1e-12);
        assert_eq!(grad.len(), 2);
    }

    #[test]
    fn test_fold_empty_returns_initial() {
        let ctx = Context::default();
        let start = Variable::new(vec![1.0, 2.0]);
        let out = fold(&ctx, &start.node(), &[], |s, _| Rc::clone(s));
        assert_eq!(out.output(), &[1.0, 2.0]);

        let mut grad = Gradient::for_vars([&start]);
        backward(out.as_ref(), &[3.0, 4.0], &mut grad);
        assert_eq!(grad.get(start.id()).unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_fold_stops_when_state_is_reset() {
        let ctx = Context::default();
        let start = Variable::new(vec![1.0]);
        let x = Variable::new(vec![2.0]);
        let nodes = [x.node(), constant(vec![5.0]), x.node()];
        // The middle step ignores the incoming state.
        let mut i = 0;
        let out = fold(&ctx, &start.node(), &nodes, |s, input| {
            i += 1;
            if i == 2 {
                Rc::clone(input)
            } else {
                ops::add(&ctx, s, input)
            }
        });
        assert_eq!(out.output(), &[7.0]);
        assert!(!out.leaves().contains(start.id()));

        let mut grad = Gradient::for_vars([&start, &x]);
        backward(out.as_ref(), &[1.0], &mut grad);
        assert_eq!(grad.get(start.id()).unwrap(), &[0.0]);
        assert_eq!(grad.get(x.id()).unwrap(), &[1.0]);
    }

    #[test]
    fn test_fold_r_matches_fold() {
        let ctx = Context::default();
        let start = Variable::new(vec![2.0, 1.0]);
        let xs = inputs();
        let mut rv = RVector::new();
        rv.insert(start.id(), vec![0.0, 0.0]);

        let nodes: Vec<NodeRef> = xs.iter().map(Variable::node).collect();
        let plain = fold(&ctx, &start.node(), &nodes, |s, x| {
            ops::mul(&ctx, &ops::inverse(&ctx, s), x)
        });
        let r_nodes: Vec<RNodeRef> = xs.iter().map(|x| x.r_node(&rv)).collect();
        let dual = fold_r(&ctx, &start.r_node(&rv), &r_nodes, |s, x| {
            ops::mul_r(&ctx, &ops::inverse_r(&ctx, s), x)
        });
        assert_eq!(plain.output(), dual.output());
        assert_eq!(dual.r_output(), &[0.0, 0.0]);

        let mut g1 = Gradient::for_vars([&start]);
        let mut g2 = Gradient::for_vars([&start]);
        let mut rgrad = Gradient::for_vars([&start]);
        backward(plain.as_ref(), &[1.0, 1.0], &mut g1);
        backward_r(dual.as_ref(), &[1.0, 1.0], &[0.0, 0.0], &mut rgrad, Some(&mut g2));
        assert_eq!(g1, g2);
        assert_eq!(rgrad.get(start.id()).unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn test_fold_r_hessian_along_initial_state() {
        let ctx = Context::default();
        let start = Variable::new(vec![3.0]);
        let mut rv = RVector::new();
        rv.insert(start.id(), vec![1.0]);

        // Two steps of s ← s²: f = s⁴, f'' = 12 s² = 108.
        let r_inputs = [constant_r(vec![0.0]), constant_r(vec![0.0])];
        let out = fold_r(&ctx, &start.r_node(&rv), &r_inputs, |s, x| {
            ops::add_r(&ctx, &ops::square_r(&ctx, s), x)
        });
        assert_eq!(out.output(), &[81.0]);
        assert_eq!(out.r_output(), &[108.0]);

        let mut rgrad = Gradient::for_vars([&start]);
        backward_r(out.as_ref(), &[1.0], &[0.0], &mut rgrad, None);
        assert_eq!(rgrad.get(start.id()).unwrap(), &[108.0]);
        assert_eq!(rgrad.len(), 1);
    }
}
