//! Elementwise nonlinearities.

use crate::gradient::{Gradient, RGradient, RVector};
use crate::leaf_set::LeafSet;
use crate::node::{Func, Node, NodeRef, RFunc, RNode, RNodeRef};
use crate::storage::{Buffer, Context};
use std::rc::Rc;

#[derive(Debug)]
struct ExpNode {
    input: NodeRef,
    output: Buffer,
}

/// Elementwise `eᵃ`.
///
/// # Example
///
/// ```
/// use autofunc::{Context, Gradient, Variable, backward, ops};
///
/// let ctx = Context::default();
/// let x = Variable::new(vec![0.0, 1.0]);
/// let y = ops::exp(&ctx, &x.node());
/// assert_eq!(y.output()[0], 1.0);
///
/// let mut grad = Gradient::for_vars([&x]);
/// backward(y.as_ref(), &[1.0, 1.0], &mut grad);
/// assert_eq!(grad.get(x.id()).unwrap()[1], 1f64.exp());
/// ```
pub fn exp(ctx: &Context, a: &NodeRef) -> NodeRef {
    Rc::new(ExpNode {
        output: ctx.map(a.output(), f64::exp),
        input: Rc::clone(a),
    })
}

impl Node for ExpNode {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        for (u, &y) in upstream.iter_mut().zip(self.output.iter()) {
            *u *= y;
        }
        self.input.propagate_gradient(upstream, grad);
    }
}

#[derive(Debug)]
struct RExpNode {
    input: RNodeRef,
    output: Buffer,
    r_output: Buffer,
}

/// Elementwise `eᵃ` with tangent `eᵃ ȧ`.
pub fn exp_r(ctx: &Context, a: &RNodeRef) -> RNodeRef {
    let output = ctx.map(a.output(), f64::exp);
    let r_output = ctx.zip(&output, a.r_output(), |y, xr| y * xr);
    Rc::new(RExpNode {
        output,
        r_output,
        input: Rc::clone(a),
    })
}

impl RNode for RExpNode {
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
        // ẏ = y ȧ, so d/dt (u y) = u̇ y + u ẏ.
        for i in 0..upstream.len() {
            upstream_r[i] = upstream_r[i] * self.output[i] + upstream[i] * self.r_output[i];
            upstream[i] *= self.output[i];
        }
        self.input
            .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    }
}

#[derive(Debug)]
struct LogNode {
    input: NodeRef,
    output: Buffer,
}

/// Elementwise natural logarithm.
///
/// Non-positive inputs yield `-inf` or NaN.
pub fn log(ctx: &Context, a: &NodeRef) -> NodeRef {
    Rc::new(LogNode {
        output: ctx.map(a.output(), f64::ln),
        input: Rc::clone(a),
    })
}

impl Node for LogNode {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        for (u, &a) in upstream.iter_mut().zip(self.input.output()) {
            *u /= a;
        }
        self.input.propagate_gradient(upstream, grad);
    }
}

#[derive(Debug)]
struct RLogNode {
    input: RNodeRef,
    output: Buffer,
    r_output: Buffer,
}

/// Elementwise natural logarithm with tangent `ȧ / a`.
pub fn log_r(ctx: &Context, a: &RNodeRef) -> RNodeRef {
    Rc::new(RLogNode {
        output: ctx.map(a.output(), f64::ln),
        r_output: ctx.zip(a.r_output(), a.output(), |xr, x| xr / x),
        input: Rc::clone(a),
    })
}

impl RNode for RLogNode {
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
        let (a, a_r) = (self.input.output(), self.input.r_output());
        for i in 0..a.len() {
            upstream_r[i] = (upstream_r[i] - upstream[i] * a_r[i] / a[i]) / a[i];
            upstream[i] /= a[i];
        }
        self.input
            .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    }
}

/// [`exp`] as a reusable function.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exp;

impl Func for Exp {
    fn apply(&self, ctx: &Context, input: &NodeRef) -> NodeRef {
        exp(ctx, input)
    }
}

impl RFunc for Exp {
    fn apply_r(&self, ctx: &Context, _rv: &RVector, input: &RNodeRef) -> RNodeRef {
        exp_r(ctx, input)
    }
}

/// [`log`] as a reusable function.
#[derive(Debug, Clone, Copy, Default)]
pub struct Log;

impl Func for Log {
    fn apply(&self, ctx: &Context, input: &NodeRef) -> NodeRef {
        log(ctx, input)
    }
}

impl RFunc for Log {
    fn apply_r(&self, ctx: &Context, _rv: &RVector, input: &RNodeRef) -> RNodeRef {
        log_r(ctx, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::{backward, backward_r};
    use crate::variable::Variable;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_of_exp_is_identity() {
        let ctx = Context::default();
        let x = Variable::new(vec![-1.0, 0.5, 2.0]);
        let y = Log.apply(&ctx, &Exp.apply(&ctx, &x.node()));
        for (got, want) in y.output().iter().zip(x.vector()) {
            assert_relative_eq!(*got, *want, epsilon = 1e-12);
        }

        let mut grad = Gradient::for_vars([&x]);
        backward(y.as_ref(), &[1.0, 2.0, 3.0], &mut grad);
        let g = grad.get(x.id()).unwrap();
        assert_relative_eq!(g[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(g[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(g[2], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_log_of_zero() {
        let ctx = Context::default();
        let y = log(&ctx, &Variable::new(vec![0.0]).node());
        assert_eq!(y.output()[0], f64::NEG_INFINITY);
    }

    #[test]
    fn test_exp_r_second_derivative() {
        let ctx = Context::default();
        let x = Variable::new(vec![0.5]);
        let mut rv = RVector::new();
        rv.insert(x.id(), vec![2.0]);
        let y = Exp.apply_r(&ctx, &rv, &x.r_node(&rv));
        assert_relative_eq!(y.r_output()[0], 2.0 * 0.5f64.exp());

        let mut rgrad = Gradient::for_vars([&x]);
        backward_r(y.as_ref(), &[1.0], &[0.0], &mut rgrad, None);
        assert_relative_eq!(rgrad.get(x.id()).unwrap()[0], 2.0 * 0.5f64.exp());
    }

    #[test]
    fn test_log_r_second_derivative() {
        let ctx = Context::default();
        let x = Variable::new(vec![2.0]);
        let mut rv = RVector::new();
        rv.insert(x.id(), vec![1.0]);
        let y = log_r(&ctx, &x.r_node(&rv));
        assert_relative_eq!(y.r_output()[0], 0.5);

        // d²(ln x)/dx² = -1/x²
        let mut rgrad = Gradient::for_vars([&x]);
        backward_r(y.as_ref(), &[1.0], &[0.0], &mut rgrad, None);
        assert_relative_eq!(rgrad.get(x.id()).unwrap()[0], -0.25);
    }
}
