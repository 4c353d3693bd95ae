//! Binary elementwise arithmetic: sum, difference, product, quotient.

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{
    Node, NodeRef, RNode, RNodeRef, assert_same_len, propagate_r_to_both, propagate_to_both,
};
use crate::storage::{Buffer, Context};
use std::rc::Rc;

#[derive(Debug)]
struct Sum {
    ctx: Context,
    a: NodeRef,
    b: NodeRef,
    output: Buffer,
    leaves: LeafSet,
}

/// Elementwise `a + b`.
///
/// # Panics
///
/// Panics if the inputs differ in length.
pub fn add(ctx: &Context, a: &NodeRef, b: &NodeRef) -> NodeRef {
    assert_same_len("add", a.output().len(), b.output().len());
    Rc::new(Sum {
        ctx: ctx.clone(),
        output: ctx.zip(a.output(), b.output(), |x, y| x + y),
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
    })
}

impl Node for Sum {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        propagate_to_both(&self.ctx, &self.a, &self.b, upstream, grad);
    }
}

#[derive(Debug)]
struct RSum {
    ctx: Context,
    a: RNodeRef,
    b: RNodeRef,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// Elementwise `a + b` with tangent `ȧ + ḃ`.
pub fn add_r(ctx: &Context, a: &RNodeRef, b: &RNodeRef) -> RNodeRef {
    assert_same_len("add_r", a.output().len(), b.output().len());
    Rc::new(RSum {
        ctx: ctx.clone(),
        output: ctx.zip(a.output(), b.output(), |x, y| x + y),
        r_output: ctx.zip(a.r_output(), b.r_output(), |x, y| x + y),
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
    })
}

impl RNode for RSum {
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
        propagate_r_to_both(
            &self.ctx, &self.a, &self.b, upstream, upstream_r, rgrad, grad,
        );
    }
}

#[derive(Debug)]
struct Difference {
    ctx: Context,
    a: NodeRef,
    b: NodeRef,
    output: Buffer,
    leaves: LeafSet,
}

/// Elementwise `a - b`.
pub fn sub(ctx: &Context, a: &NodeRef, b: &NodeRef) -> NodeRef {
    assert_same_len("sub", a.output().len(), b.output().len());
    Rc::new(Difference {
        ctx: ctx.clone(),
        output: ctx.zip(a.output(), b.output(), |x, y| x - y),
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
    })
}

impl Node for Difference {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        // `a` sees the upstream untouched, so it goes first; afterwards the
        // slice is free to be negated for `b`.
        if !self.a.constant(grad) {
            if self.b.constant(grad) {
                self.a.propagate_gradient(upstream, grad);
                return;
            }
            let mut copy = self.ctx.copy_of(upstream);
            self.a.propagate_gradient(&mut copy, grad);
        }
        if !self.b.constant(grad) {
            negate(upstream);
            self.b.propagate_gradient(upstream, grad);
        }
    }
}

#[derive(Debug)]
struct RDifference {
    ctx: Context,
    a: RNodeRef,
    b: RNodeRef,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// Elementwise `a - b` with tangent `ȧ - ḃ`.
pub fn sub_r(ctx: &Context, a: &RNodeRef, b: &RNodeRef) -> RNodeRef {
    assert_same_len("sub_r", a.output().len(), b.output().len());
    Rc::new(RDifference {
        ctx: ctx.clone(),
        output: ctx.zip(a.output(), b.output(), |x, y| x - y),
        r_output: ctx.zip(a.r_output(), b.r_output(), |x, y| x - y),
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
    })
}

impl RNode for RDifference {
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
        mut grad: Option<&mut Gradient>,
    ) {
        let a_live = !self.a.constant(rgrad, grad.as_deref());
        let b_live = !self.b.constant(rgrad, grad.as_deref());
        if a_live {
            if !b_live {
                self.a
                    .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
                return;
            }
            let mut copy = self.ctx.copy_of(upstream);
            let mut copy_r = self.ctx.copy_of(upstream_r);
            self.a
                .propagate_r_gradient(&mut copy, &mut copy_r, rgrad, grad.as_deref_mut());
        }
        if b_live {
            negate(upstream);
            negate(upstream_r);
            self.b
                .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
        }
    }
}

#[derive(Debug)]
struct Product {
    ctx: Context,
    a: NodeRef,
    b: NodeRef,
    output: Buffer,
    leaves: LeafSet,
}

/// Elementwise product `a ⊙ b`.
pub fn mul(ctx: &Context, a: &NodeRef, b: &NodeRef) -> NodeRef {
    assert_same_len("mul", a.output().len(), b.output().len());
    Rc::new(Product {
        ctx: ctx.clone(),
        output: ctx.zip(a.output(), b.output(), |x, y| x * y),
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
    })
}

impl Node for Product {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        if !self.a.constant(grad) {
            let mut ga = self.ctx.zip(upstream, self.b.output(), |u, b| u * b);
            self.a.propagate_gradient(&mut ga, grad);
        }
        if !self.b.constant(grad) {
            for (u, &a) in upstream.iter_mut().zip(self.a.output()) {
                *u *= a;
            }
            self.b.propagate_gradient(upstream, grad);
        }
    }
}

#[derive(Debug)]
struct RProduct {
    ctx: Context,
    a: RNodeRef,
    b: RNodeRef,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// Elementwise product with tangent `ȧ ⊙ b + a ⊙ ḃ`.
pub fn mul_r(ctx: &Context, a: &RNodeRef, b: &RNodeRef) -> RNodeRef {
    assert_same_len("mul_r", a.output().len(), b.output().len());
    let mut r_output = ctx.alloc(a.output().len());
    for (i, r) in r_output.iter_mut().enumerate() {
        *r = a.r_output()[i] * b.output()[i] + a.output()[i] * b.r_output()[i];
    }
    Rc::new(RProduct {
        ctx: ctx.clone(),
        output: ctx.zip(a.output(), b.output(), |x, y| x * y),
        r_output,
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
    })
}

impl RNode for RProduct {
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
        mut grad: Option<&mut Gradient>,
    ) {
        let (a, a_r) = (self.a.output(), self.a.r_output());
        let (b, b_r) = (self.b.output(), self.b.r_output());
        if !self.a.constant(rgrad, grad.as_deref()) {
            let mut ga = self.ctx.alloc(a.len());
            let mut ga_r = self.ctx.alloc(a.len());
            for i in 0..a.len() {
                ga[i] = upstream[i] * b[i];
                ga_r[i] = upstream_r[i] * b[i] + upstream[i] * b_r[i];
            }
            self.a
                .propagate_r_gradient(&mut ga, &mut ga_r, rgrad, grad.as_deref_mut());
        }
        if !self.b.constant(rgrad, grad.as_deref()) {
            for i in 0..a.len() {
                upstream_r[i] = upstream_r[i] * a[i] + upstream[i] * a_r[i];
                upstream[i] *= a[i];
            }
            self.b
                .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
        }
    }
}

#[derive(Debug)]
struct Quotient {
    ctx: Context,
    a: NodeRef,
    b: NodeRef,
    output: Buffer,
    leaves: LeafSet,
}

/// Elementwise quotient `a / b`.
///
/// Division by zero is not guarded; the output follows IEEE-754.
pub fn div(ctx: &Context, a: &NodeRef, b: &NodeRef) -> NodeRef {
    assert_same_len("div", a.output().len(), b.output().len());
    Rc::new(Quotient {
        ctx: ctx.clone(),
        output: ctx.zip(a.output(), b.output(), |x, y| x / y),
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
    })
}

impl Node for Quotient {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let b = self.b.output();
        if !self.a.constant(grad) {
            let mut ga = self.ctx.zip(upstream, b, |u, b| u / b);
            self.a.propagate_gradient(&mut ga, grad);
        }
        if !self.b.constant(grad) {
            // d(a/b)/db = -(a/b)/b
            for ((u, &y), &b) in upstream.iter_mut().zip(self.output.iter()).zip(b) {
                *u *= -y / b;
            }
            self.b.propagate_gradient(upstream, grad);
        }
    }
}

#[derive(Debug)]
struct RQuotient {
    ctx: Context,
    a: RNodeRef,
    b: RNodeRef,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// Elementwise quotient with tangent `ȧ/b - a ḃ/b²`.
pub fn div_r(ctx: &Context, a: &RNodeRef, b: &RNodeRef) -> RNodeRef {
    assert_same_len("div_r", a.output().len(), b.output().len());
    let output = ctx.zip(a.output(), b.output(), |x, y| x / y);
    let mut r_output = ctx.alloc(output.len());
    for (i, r) in r_output.iter_mut().enumerate() {
        let b_i = b.output()[i];
        *r = (a.r_output()[i] - output[i] * b.r_output()[i]) / b_i;
    }
    Rc::new(RQuotient {
        ctx: ctx.clone(),
        output,
        r_output,
        leaves: a.leaves().union(b.leaves()),
        a: Rc::clone(a),
        b: Rc::clone(b),
    })
}

impl RNode for RQuotient {
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
        mut grad: Option<&mut Gradient>,
    ) {
        let (b, b_r) = (self.b.output(), self.b.r_output());
        let (y, y_r) = (&self.output, &self.r_output);
        if !self.a.constant(rgrad, grad.as_deref()) {
            let mut ga = self.ctx.alloc(b.len());
            let mut ga_r = self.ctx.alloc(b.len());
            for i in 0..b.len() {
                ga[i] = upstream[i] / b[i];
                ga_r[i] = (upstream_r[i] - upstream[i] * b_r[i] / b[i]) / b[i];
            }
            self.a
                .propagate_r_gradient(&mut ga, &mut ga_r, rgrad, grad.as_deref_mut());
        }
        if !self.b.constant(rgrad, grad.as_deref()) {
            // g = -u y / b
            // ġ = -(u̇ y + u ẏ)/b + u y ḃ / b²
            for i in 0..b.len() {
                let u = upstream[i];
                upstream_r[i] =
                    -(upstream_r[i] * y[i] + u * y_r[i]) / b[i] + u * y[i] * b_r[i] / (b[i] * b[i]);
                upstream[i] = -u * y[i] / b[i];
            }
            self.b
                .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
        }
    }
}

pub(crate) fn negate(v: &mut [f64]) {
    for x in v.iter_mut() {
        *x = -*x;
    }
}
