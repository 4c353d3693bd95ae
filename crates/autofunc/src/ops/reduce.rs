//! Reduction to a single component.

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::storage::{Buffer, Context};
use std::rc::Rc;

#[derive(Debug)]
struct SumAll {
    ctx: Context,
    input: NodeRef,
    output: Buffer,
}

/// `[Σ aᵢ]`, a length-1 output.
pub fn sum_all(ctx: &Context, a: &NodeRef) -> NodeRef {
    let mut output = ctx.alloc(1);
    output[0] = a.output().iter().sum();
    Rc::new(SumAll {
        ctx: ctx.clone(),
        output,
        input: Rc::clone(a),
    })
}

impl Node for SumAll {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let mut spread = self.ctx.alloc(self.input.output().len());
        spread.fill(upstream[0]);
        self.input.propagate_gradient(&mut spread, grad);
    }
}

#[derive(Debug)]
struct RSumAll {
    ctx: Context,
    input: RNodeRef,
    output: Buffer,
    r_output: Buffer,
}

/// `[Σ aᵢ]` with tangent `[Σ ȧᵢ]`.
pub fn sum_all_r(ctx: &Context, a: &RNodeRef) -> RNodeRef {
    let mut output = ctx.alloc(1);
    let mut r_output = ctx.alloc(1);
    output[0] = a.output().iter().sum();
    r_output[0] = a.r_output().iter().sum();
    Rc::new(RSumAll {
        ctx: ctx.clone(),
        output,
        r_output,
        input: Rc::clone(a),
    })
}

impl RNode for RSumAll {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn r_output(&self) -> &[f64] {
        &self.r_output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_r_gradient(
        &self,
        upstream: &mut [f64],
        upstream_r: &mut [f64],
        rgrad: &mut RGradient,
        grad: Option<&mut Gradient>,
    ) {
        let len = self.input.output().len();
        let mut spread = self.ctx.alloc(len);
        let mut spread_r = self.ctx.alloc(len);
        spread.fill(upstream[0]);
        spread_r.fill(upstream_r[0]);
        self.input
            .propagate_r_gradient(&mut spread, &mut spread_r, rgrad, grad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::{backward, backward_r};
    use crate::gradient::RVector;
    use crate::variable::Variable;

    #[test]
    fn test_sum_all() {
        let ctx = Context::default();
        let x = Variable::new(vec![1.0, 2.0, 3.5]);
        let y = sum_all(&ctx, &x.node());
        assert_eq!(y.output(), &[6.5]);

        let mut grad = Gradient::for_vars([&x]);
        backward(y.as_ref(), &[2.0], &mut grad);
        assert_eq!(grad.get(x.id()).unwrap(), &[2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_sum_all_empty() {
        let ctx = Context::default();
        let y = sum_all(&ctx, &Variable::zeros(0).node());
        assert_eq!(y.output(), &[0.0]);
    }

    #[test]
    fn test_sum_all_r() {
        let ctx = Context::default();
        let x = Variable::new(vec![1.0, 2.0]);
        let mut rv = RVector::new();
        rv.insert(x.id(), vec![0.5, 0.25]);
        let y = sum_all_r(&ctx, &x.r_node(&rv));
        assert_eq!(y.r_output(), &[0.75]);

        let mut rgrad = Gradient::for_vars([&x]);
        backward_r(y.as_ref(), &[1.0], &[3.0], &mut rgrad, None);
        assert_eq!(rgrad.get(x.id()).unwrap(), &[3.0, 3.0]);
    }
}
