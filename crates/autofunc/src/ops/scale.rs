//! Scalar scaling and offsets, by a constant or by the first component of a node.

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::storage::{Buffer, Context};
use std::rc::Rc;

#[derive(Debug)]
struct Scaled {
    input: NodeRef,
    factor: f64,
    output: Buffer,
}

/// `c · a` for a constant `c`.
pub fn scale(ctx: &Context, a: &NodeRef, factor: f64) -> NodeRef {
    Rc::new(Scaled {
        output: ctx.map(a.output(), |x| x * factor),
        input: Rc::clone(a),
        factor,
    })
}

impl Node for Scaled {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        for u in upstream.iter_mut() {
            *u *= self.factor;
        }
        self.input.propagate_gradient(upstream, grad);
    }
}

#[derive(Debug)]
struct RScaled {
    input: RNodeRef,
    factor: f64,
    output: Buffer,
    r_output: Buffer,
}

/// `c · a` with tangent `c · ȧ`.
pub fn scale_r(ctx: &Context, a: &RNodeRef, factor: f64) -> RNodeRef {
    Rc::new(RScaled {
        output: ctx.map(a.output(), |x| x * factor),
        r_output: ctx.map(a.r_output(), |x| x * factor),
        input: Rc::clone(a),
        factor,
    })
}

impl RNode for RScaled {
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
        for (u, ur) in upstream.iter_mut().zip(upstream_r.iter_mut()) {
            *u *= self.factor;
            *ur *= self.factor;
        }
        self.input
            .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    }
}

#[derive(Debug)]
struct Offset {
    input: NodeRef,
    output: Buffer,
}

/// `a + c` for a constant `c`.
pub fn add_scaler(ctx: &Context, a: &NodeRef, offset: f64) -> NodeRef {
    Rc::new(Offset {
        output: ctx.map(a.output(), |x| x + offset),
        input: Rc::clone(a),
    })
}

impl Node for Offset {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        self.input.propagate_gradient(upstream, grad);
    }
}

#[derive(Debug)]
struct ROffset {
    input: RNodeRef,
    output: Buffer,
    r_output: Buffer,
}

/// `a + c`; the tangent passes through unchanged.
pub fn add_scaler_r(ctx: &Context, a: &RNodeRef, offset: f64) -> RNodeRef {
    Rc::new(ROffset {
        output: ctx.map(a.output(), |x| x + offset),
        r_output: ctx.copy_of(a.r_output()),
        input: Rc::clone(a),
    })
}

impl RNode for ROffset {
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
        self.input
            .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
    }
}

fn first(op: &str, scaler: &[f64]) -> f64 {
    assert!(!scaler.is_empty(), "{op}: scaler input is empty");
    scaler[0]
}

#[derive(Debug)]
struct ScaleFirst {
    ctx: Context,
    input: NodeRef,
    scaler: NodeRef,
    output: Buffer,
    leaves: LeafSet,
}

/// `s₀ · a`, where `s₀` is the first component of `scaler`.
///
/// The gradient with respect to `scaler` lands in its component 0.
///
/// # Panics
///
/// Panics if `scaler` is empty.
pub fn scale_first(ctx: &Context, a: &NodeRef, scaler: &NodeRef) -> NodeRef {
    let s = first("scale_first", scaler.output());
    Rc::new(ScaleFirst {
        ctx: ctx.clone(),
        output: ctx.map(a.output(), |x| x * s),
        leaves: a.leaves().union(scaler.leaves()),
        input: Rc::clone(a),
        scaler: Rc::clone(scaler),
    })
}

impl Node for ScaleFirst {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        if !self.scaler.constant(grad) {
            let mut gs = self.ctx.alloc(self.scaler.output().len());
            gs[0] = dot(upstream, self.input.output());
            self.scaler.propagate_gradient(&mut gs, grad);
        }
        if !self.input.constant(grad) {
            let s = self.scaler.output()[0];
            for u in upstream.iter_mut() {
                *u *= s;
            }
            self.input.propagate_gradient(upstream, grad);
        }
    }
}

#[derive(Debug)]
struct RScaleFirst {
    ctx: Context,
    input: RNodeRef,
    scaler: RNodeRef,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// `s₀ · a` with tangent `ṡ₀ · a + s₀ · ȧ`.
pub fn scale_first_r(ctx: &Context, a: &RNodeRef, scaler: &RNodeRef) -> RNodeRef {
    let s = first("scale_first_r", scaler.output());
    let s_r = scaler.r_output()[0];
    Rc::new(RScaleFirst {
        ctx: ctx.clone(),
        output: ctx.map(a.output(), |x| x * s),
        r_output: ctx.zip(a.output(), a.r_output(), |x, xr| s_r * x + s * xr),
        leaves: a.leaves().union(scaler.leaves()),
        input: Rc::clone(a),
        scaler: Rc::clone(scaler),
    })
}

impl RNode for RScaleFirst {
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
        let (a, a_r) = (self.input.output(), self.input.r_output());
        if !self.scaler.constant(rgrad, grad.as_deref()) {
            let len = self.scaler.output().len();
            let mut gs = self.ctx.alloc(len);
            let mut gs_r = self.ctx.alloc(len);
            gs[0] = dot(upstream, a);
            gs_r[0] = dot(upstream_r, a) + dot(upstream, a_r);
            self.scaler
                .propagate_r_gradient(&mut gs, &mut gs_r, rgrad, grad.as_deref_mut());
        }
        if !self.input.constant(rgrad, grad.as_deref()) {
            let s = self.scaler.output()[0];
            let s_r = self.scaler.r_output()[0];
            for (u, ur) in upstream.iter_mut().zip(upstream_r.iter_mut()) {
                *ur = s * *ur + s_r * *u;
                *u *= s;
            }
            self.input
                .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
        }
    }
}

#[derive(Debug)]
struct AddFirst {
    ctx: Context,
    input: NodeRef,
    scaler: NodeRef,
    output: Buffer,
    leaves: LeafSet,
}

/// `a + s₀`, where `s₀` is the first component of `scaler`.
///
/// # Panics
///
/// Panics if `scaler` is empty.
pub fn add_first(ctx: &Context, a: &NodeRef, scaler: &NodeRef) -> NodeRef {
    let s = first("add_first", scaler.output());
    Rc::new(AddFirst {
        ctx: ctx.clone(),
        output: ctx.map(a.output(), |x| x + s),
        leaves: a.leaves().union(scaler.leaves()),
        input: Rc::clone(a),
        scaler: Rc::clone(scaler),
    })
}

impl Node for AddFirst {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        // The sum has to be taken before `input` may overwrite the slice.
        if !self.scaler.constant(grad) {
            let mut gs = self.ctx.alloc(self.scaler.output().len());
            gs[0] = upstream.iter().sum();
            self.scaler.propagate_gradient(&mut gs, grad);
        }
        if !self.input.constant(grad) {
            self.input.propagate_gradient(upstream, grad);
        }
    }
}

#[derive(Debug)]
struct RAddFirst {
    ctx: Context,
    input: RNodeRef,
    scaler: RNodeRef,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// `a + s₀` with tangent `ȧ + ṡ₀`.
pub fn add_first_r(ctx: &Context, a: &RNodeRef, scaler: &RNodeRef) -> RNodeRef {
    let s = first("add_first_r", scaler.output());
    let s_r = scaler.r_output()[0];
    Rc::new(RAddFirst {
        ctx: ctx.clone(),
        output: ctx.map(a.output(), |x| x + s),
        r_output: ctx.map(a.r_output(), |x| x + s_r),
        leaves: a.leaves().union(scaler.leaves()),
        input: Rc::clone(a),
        scaler: Rc::clone(scaler),
    })
}

impl RNode for RAddFirst {
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
        if !self.scaler.constant(rgrad, grad.as_deref()) {
            let len = self.scaler.output().len();
            let mut gs = self.ctx.alloc(len);
            let mut gs_r = self.ctx.alloc(len);
            gs[0] = upstream.iter().sum();
            gs_r[0] = upstream_r.iter().sum();
            self.scaler
                .propagate_r_gradient(&mut gs, &mut gs_r, rgrad, grad.as_deref_mut());
        }
        if !self.input.constant(rgrad, grad.as_deref()) {
            self.input
                .propagate_r_gradient(upstream, upstream_r, rgrad, grad);
        }
    }
}

pub(crate) fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
