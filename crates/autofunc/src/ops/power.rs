//! Powers: `aᵖ`, `1/a`, `a²`.

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::storage::{Buffer, Context};
use std::rc::Rc;

#[derive(Debug)]
struct Pow {
    input: NodeRef,
    power: f64,
    output: Buffer,
    leaves: LeafSet,
}

/// Elementwise `aᵖ`.
///
/// With `p == 0` the result is all ones and constant with respect to every
/// accumulator. Fractional powers of negative numbers yield NaN.
pub fn pow(ctx: &Context, a: &NodeRef, power: f64) -> NodeRef {
    Rc::new(Pow {
        output: ctx.map(a.output(), |x| x.powf(power)),
        leaves: pow_leaves(a.leaves(), power),
        input: Rc::clone(a),
        power,
    })
}

fn pow_leaves(input: &LeafSet, power: f64) -> LeafSet {
    if power == 0.0 {
        LeafSet::empty()
    } else {
        input.clone()
    }
}

impl Node for Pow {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let p = self.power;
        let (a, y) = (self.input.output(), &self.output);
        for (i, u) in upstream.iter_mut().enumerate() {
            *u *= slope(p, a[i], y[i]);
        }
        self.input.propagate_gradient(upstream, grad);
    }
}

/// `p aᵖ⁻¹` from the forward value `y = aᵖ`. Zero inputs fall back to
/// `powf`, where `y / a` would be `0 / 0`.
fn slope(p: f64, a: f64, y: f64) -> f64 {
    if a != 0.0 {
        p * y / a
    } else {
        p * a.powf(p - 1.0)
    }
}

#[derive(Debug)]
struct RPow {
    input: RNodeRef,
    power: f64,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// Elementwise `aᵖ` with tangent `p aᵖ⁻¹ ȧ`.
pub fn pow_r(ctx: &Context, a: &RNodeRef, power: f64) -> RNodeRef {
    let p = power;
    let r_output = if p == 0.0 {
        ctx.alloc(a.output().len())
    } else {
        ctx.zip(a.output(), a.r_output(), |x, xr| p * x.powf(p - 1.0) * xr)
    };
    Rc::new(RPow {
        output: ctx.map(a.output(), |x| x.powf(p)),
        r_output,
        leaves: pow_leaves(a.leaves(), p),
        input: Rc::clone(a),
        power,
    })
}

impl RNode for RPow {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn r_output(&self) -> &[f64] {
        &self.r_output
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
        let p = self.power;
        let (a, a_r) = (self.input.output(), self.input.r_output());
        for i in 0..a.len() {
            let d1 = slope(p, a[i], self.output[i]);
            // The second derivative vanishes for p == 1; skip it so a zero
            // input does not produce 0 * inf.
            let d2 = if p == 1.0 {
                0.0
            } else if a[i] != 0.0 {
                (p - 1.0) * d1 / a[i]
            } else {
                p * (p - 1.0) * a[i].powf(p - 2.0)
            };
            upstream_r[i] = upstream_r[i] * d1 + upstream[i] * d2 * a_r[i];
            upstream[i] *= d1;
        }
        self.input
            .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    }
}

#[derive(Debug)]
struct Inverse {
    input: NodeRef,
    output: Buffer,
}

/// Elementwise `1/a`.
pub fn inverse(ctx: &Context, a: &NodeRef) -> NodeRef {
    Rc::new(Inverse {
        output: ctx.map(a.output(), |x| 1.0 / x),
        input: Rc::clone(a),
    })
}

impl Node for Inverse {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        for (u, &y) in upstream.iter_mut().zip(self.output.iter()) {
            *u *= -y * y;
        }
        self.input.propagate_gradient(upstream, grad);
    }
}

#[derive(Debug)]
struct RInverse {
    input: RNodeRef,
    output: Buffer,
    r_output: Buffer,
}

/// Elementwise `1/a` with tangent `-ȧ/a²`.
pub fn inverse_r(ctx: &Context, a: &RNodeRef) -> RNodeRef {
    let output = ctx.map(a.output(), |x| 1.0 / x);
    let r_output = ctx.zip(&output, a.r_output(), |y, xr| -y * y * xr);
    Rc::new(RInverse {
        output,
        r_output,
        input: Rc::clone(a),
    })
}

impl RNode for RInverse {
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
        for i in 0..upstream.len() {
            let (y, y_r) = (self.output[i], self.r_output[i]);
            upstream_r[i] = -upstream_r[i] * y * y - 2.0 * upstream[i] * y * y_r;
            upstream[i] *= -y * y;
        }
        self.input
            .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    }
}

#[derive(Debug)]
struct Square {
    input: NodeRef,
    output: Buffer,
}

/// Elementwise `a²`.
pub fn square(ctx: &Context, a: &NodeRef) -> NodeRef {
    Rc::new(Square {
        output: ctx.map(a.output(), |x| x * x),
        input: Rc::clone(a),
    })
}

impl Node for Square {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        for (u, &a) in upstream.iter_mut().zip(self.input.output()) {
            *u *= 2.0 * a;
        }
        self.input.propagate_gradient(upstream, grad);
    }
}

#[derive(Debug)]
struct RSquare {
    input: RNodeRef,
    output: Buffer,
    r_output: Buffer,
}

/// Elementwise `a²` with tangent `2 a ȧ`.
pub fn square_r(ctx: &Context, a: &RNodeRef) -> RNodeRef {
    Rc::new(RSquare {
        output: ctx.map(a.output(), |x| x * x),
        r_output: ctx.zip(a.output(), a.r_output(), |x, xr| 2.0 * x * xr),
        input: Rc::clone(a),
    })
}

impl RNode for RSquare {
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
            upstream_r[i] = 2.0 * (upstream_r[i] * a[i] + upstream[i] * a_r[i]);
            upstream[i] *= 2.0 * a[i];
        }
        self.input
            .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backward::{backward, backward_r};
    use crate::gradient::RVector;
    use crate::variable::Variable;
    use approx::assert_relative_eq;

    #[test]
    fn test_pow_gradient() {
        let ctx = Context::default();
        let x = Variable::new(vec![2.0, 3.0]);
        let y = pow(&ctx, &x.node(), 3.0);
        assert_eq!(y.output(), &[8.0, 27.0]);

        let mut grad = Gradient::for_vars([&x]);
        backward(y.as_ref(), &[1.0, 1.0], &mut grad);
        assert_relative_eq!(grad.get(x.id()).unwrap()[0], 12.0);
        assert_relative_eq!(grad.get(x.id()).unwrap()[1], 27.0);
    }

    #[test]
    fn test_pow_zero_is_constant() {
        let ctx = Context::default();
        let x = Variable::new(vec![0.0, 5.0]);
        let y = pow(&ctx, &x.node(), 0.0);
        assert_eq!(y.output(), &[1.0, 1.0]);
        assert!(y.constant(&Gradient::for_vars([&x])));
    }

    #[test]
    fn test_pow_at_zero_input_is_finite() {
        let ctx = Context::default();
        let x = Variable::new(vec![0.0]);
        let y = pow(&ctx, &x.node(), 2.0);
        let mut grad = Gradient::for_vars([&x]);
        backward(y.as_ref(), &[1.0], &mut grad);
        assert_eq!(grad.get(x.id()).unwrap(), &[0.0]);
    }

    #[test]
    fn test_pow_slope_from_output() {
        let ctx = Context::default();
        let x = Variable::new(vec![-2.0, 0.0, 0.0]);
        let cube = pow(&ctx, &x.node(), 3.0);
        let mut grad = Gradient::for_vars([&x]);
        backward(cube.as_ref(), &[1.0, 1.0, 1.0], &mut grad);
        assert_eq!(grad.get(x.id()).unwrap(), &[12.0, 0.0, 0.0]);

        let root = pow(&ctx, &x.node(), 0.5);
        let mut grad = Gradient::for_vars([&x]);
        backward(root.as_ref(), &[0.0, 1.0, 0.0], &mut grad);
        assert_eq!(grad.get(x.id()).unwrap()[1], f64::INFINITY);
    }

    #[test]
    fn test_pow_one_r_at_zero() {
        let ctx = Context::default();
        let x = Variable::new(vec![0.0]);
        let mut rv = RVector::new();
        rv.insert(x.id(), vec![1.0]);
        let y = pow_r(&ctx, &x.r_node(&rv), 1.0);

        let mut rgrad = Gradient::for_vars([&x]);
        backward_r(y.as_ref(), &[1.0], &[0.0], &mut rgrad, None);
        assert_eq!(rgrad.get(x.id()).unwrap(), &[0.0]);
    }

    #[test]
    fn test_inverse_r() {
        let ctx = Context::default();
        let x = Variable::new(vec![2.0]);
        let mut rv = RVector::new();
        rv.insert(x.id(), vec![1.0]);
        let y = inverse_r(&ctx, &x.r_node(&rv));
        assert_relative_eq!(y.output()[0], 0.5);
        assert_relative_eq!(y.r_output()[0], -0.25);

        // d²(1/x)/dx² = 2/x³
        let mut rgrad = Gradient::for_vars([&x]);
        let mut grad = Gradient::for_vars([&x]);
        backward_r(y.as_ref(), &[1.0], &[0.0], &mut rgrad, Some(&mut grad));
        assert_relative_eq!(grad.get(x.id()).unwrap()[0], -0.25);
        assert_relative_eq!(rgrad.get(x.id()).unwrap()[0], 0.25);
    }

    #[test]
    fn test_square_r_matches_pow_r() {
        let ctx = Context::default();
        let x = Variable::new(vec![1.5, -0.5]);
        let mut rv = RVector::new();
        rv.insert(x.id(), vec![0.3, 2.0]);

        let sq = square_r(&ctx, &x.r_node(&rv));
        let pw = pow_r(&ctx, &x.r_node(&rv), 2.0);
        for i in 0..2 {
            assert_relative_eq!(sq.output()[i], pw.output()[i]);
            assert_relative_eq!(sq.r_output()[i], pw.r_output()[i]);
        }

        let mut rg_sq = Gradient::for_vars([&x]);
        let mut rg_pw = Gradient::for_vars([&x]);
        backward_r(sq.as_ref(), &[1.0, 1.0], &[0.5, 0.5], &mut rg_sq, None);
        backward_r(pw.as_ref(), &[1.0, 1.0], &[0.5, 0.5], &mut rg_pw, None);
        for i in 0..2 {
            assert_relative_eq!(
                rg_sq.get(x.id()).unwrap()[i],
                rg_pw.get(x.id()).unwrap()[i],
                epsilon = 1e-12
            );
        }
    }
}
