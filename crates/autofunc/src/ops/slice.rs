//! Slicing, concatenation and repetition.

use crate::gradient::{Gradient, RGradient};
use crate::leaf_set::LeafSet;
use crate::node::{Node, NodeRef, RNode, RNodeRef};
use crate::storage::{Buffer, Context};
use std::rc::Rc;

fn check_range(op: &str, start: usize, end: usize, len: usize) {
    assert!(
        start <= end && end <= len,
        "{op}: range {start}..{end} out of bounds for length {len}"
    );
}

#[derive(Debug)]
struct Slice {
    ctx: Context,
    input: NodeRef,
    start: usize,
    output: Buffer,
}

/// Components `start..end` of `a`.
///
/// # Panics
///
/// Panics if the range is out of bounds or reversed.
///
/// # Example
///
/// ```
/// use autofunc::{Context, Variable, ops};
///
/// let ctx = Context::default();
/// let x = Variable::new(vec![1.0, 2.0, 3.0, 4.0]);
/// let s = ops::slice(&ctx, &x.node(), 1, 3);
/// assert_eq!(s.output(), &[2.0, 3.0]);
/// ```
pub fn slice(ctx: &Context, a: &NodeRef, start: usize, end: usize) -> NodeRef {
    check_range("slice", start, end, a.output().len());
    Rc::new(Slice {
        ctx: ctx.clone(),
        output: ctx.copy_of(&a.output()[start..end]),
        input: Rc::clone(a),
        start,
    })
}

impl Node for Slice {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let mut full = self.ctx.alloc(self.input.output().len());
        full[self.start..self.start + upstream.len()].copy_from_slice(upstream);
        self.input.propagate_gradient(&mut full, grad);
    }
}

#[derive(Debug)]
struct RSlice {
    ctx: Context,
    input: RNodeRef,
    start: usize,
    output: Buffer,
    r_output: Buffer,
}

/// R variant of [`slice`].
pub fn slice_r(ctx: &Context, a: &RNodeRef, start: usize, end: usize) -> RNodeRef {
    check_range("slice_r", start, end, a.output().len());
    Rc::new(RSlice {
        ctx: ctx.clone(),
        output: ctx.copy_of(&a.output()[start..end]),
        r_output: ctx.copy_of(&a.r_output()[start..end]),
        input: Rc::clone(a),
        start,
    })
}

impl RNode for RSlice {
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
        let range = self.start..self.start + upstream.len();
        let mut full = self.ctx.alloc(len);
        let mut full_r = self.ctx.alloc(len);
        full[range.clone()].copy_from_slice(upstream);
        full_r[range].copy_from_slice(upstream_r);
        self.input
            .propagate_r_gradient(&mut full, &mut full_r, rgrad, grad);
    }
}

#[derive(Debug)]
struct Concat {
    inputs: Vec<NodeRef>,
    output: Buffer,
    leaves: LeafSet,
}

/// Concatenation of the inputs' outputs, in order.
pub fn concat(ctx: &Context, inputs: &[NodeRef]) -> NodeRef {
    let total = inputs.iter().map(|n| n.output().len()).sum();
    let mut output = ctx.alloc(total);
    let mut offset = 0;
    for input in inputs {
        let part = input.output();
        output[offset..offset + part.len()].copy_from_slice(part);
        offset += part.len();
    }
    Rc::new(Concat {
        output,
        leaves: LeafSet::union_all(inputs.iter().map(|n| n.leaves())),
        inputs: inputs.to_vec(),
    })
}

impl Node for Concat {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        &self.leaves
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let mut offset = 0;
        for input in &self.inputs {
            let len = input.output().len();
            if !input.constant(grad) {
                input.propagate_gradient(&mut upstream[offset..offset + len], grad);
            }
            offset += len;
        }
    }
}

#[derive(Debug)]
struct RConcat {
    inputs: Vec<RNodeRef>,
    output: Buffer,
    r_output: Buffer,
    leaves: LeafSet,
}

/// R variant of [`concat`].
pub fn concat_r(ctx: &Context, inputs: &[RNodeRef]) -> RNodeRef {
    let total = inputs.iter().map(|n| n.output().len()).sum();
    let mut output = ctx.alloc(total);
    let mut r_output = ctx.alloc(total);
    let mut offset = 0;
    for input in inputs {
        let len = input.output().len();
        output[offset..offset + len].copy_from_slice(input.output());
        r_output[offset..offset + len].copy_from_slice(input.r_output());
        offset += len;
    }
    Rc::new(RConcat {
        output,
        r_output,
        leaves: LeafSet::union_all(inputs.iter().map(|n| n.leaves())),
        inputs: inputs.to_vec(),
    })
}

impl RNode for RConcat {
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
        let mut offset = 0;
        for input in &self.inputs {
            let len = input.output().len();
            if !input.constant(rgrad, grad.as_deref()) {
                let range = offset..offset + len;
                input.propagate_r_gradient(
                    &mut upstream[range.clone()],
                    &mut upstream_r[range],
                    rgrad,
                    grad.as_deref_mut(),
                );
            }
            offset += len;
        }
    }
}

#[derive(Debug)]
struct Repeat {
    ctx: Context,
    input: NodeRef,
    output: Buffer,
}

/// `a` repeated `n` times back to back.
pub fn repeat(ctx: &Context, a: &NodeRef, n: usize) -> NodeRef {
    Rc::new(Repeat {
        ctx: ctx.clone(),
        output: tile(ctx, a.output(), n),
        input: Rc::clone(a),
    })
}

fn tile(ctx: &Context, data: &[f64], n: usize) -> Buffer {
    let mut out = ctx.alloc(data.len() * n);
    if !data.is_empty() {
        for chunk in out.chunks_exact_mut(data.len()) {
            chunk.copy_from_slice(data);
        }
    }
    out
}

/// Sum the `n` equal segments of `data` into a fresh buffer of segment length.
fn fold_segments(ctx: &Context, data: &[f64], seg: usize) -> Buffer {
    let mut out = ctx.alloc(seg);
    if seg > 0 {
        for chunk in data.chunks_exact(seg) {
            for (o, &x) in out.iter_mut().zip(chunk) {
                *o += x;
            }
        }
    }
    out
}

impl Node for Repeat {
    fn output(&self) -> &[f64] {
        &self.output
    }

    fn leaves(&self) -> &LeafSet {
        self.input.leaves()
    }

    fn propagate_gradient(&self, upstream: &mut [f64], grad: &mut Gradient) {
        let mut summed = fold_segments(&self.ctx, upstream, self.input.output().len());
        self.input.propagate_gradient(&mut summed, grad);
    }
}

#[derive(Debug)]
struct RRepeat {
    ctx: Context,
    input: RNodeRef,
    output: Buffer,
    r_output: Buffer,
}

/// R variant of [`repeat`].
pub fn repeat_r(ctx: &Context, a: &RNodeRef, n: usize) -> RNodeRef {
    Rc::new(RRepeat {
        ctx: ctx.clone(),
        output: tile(ctx, a.output(), n),
        r_output: tile(ctx, a.r_output(), n),
        input: Rc::clone(a),
    })
}

impl RNode for RRepeat {
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
        let seg = self.input.output().len();
        let mut summed = fold_segments(&self.ctx, upstream, seg);
        let mut summed_r = fold_segments(&self.ctx, upstream_r, seg);
        self.input
            .propagate_r_gradient(&mut summed, &mut summed_r, rgrad, grad);
    }
}
