//! Applying a function to many equal-length inputs packed end to end.

use crate::gradient::RVector;
use crate::node::{Func, NodeRef, RFunc, RNodeRef};
use crate::ops::{concat, concat_r, slice, slice_r};
use crate::pool::{pool, pool_r};
use crate::storage::Context;

/// A function evaluated on `n` packed inputs at once.
///
/// `input` holds `n` equal-length segments; the output holds the `n`
/// corresponding results, also packed.
pub trait Batcher {
    fn batch(&self, ctx: &Context, input: &NodeRef, n: usize) -> NodeRef;
}

/// R variant of [`Batcher`].
pub trait RBatcher {
    fn batch_r(&self, ctx: &Context, rv: &RVector, input: &RNodeRef, n: usize) -> RNodeRef;
}

/// Segment length of a packed input.
///
/// # Panics
///
/// Panics if `n` is zero or does not divide `len`.
pub(crate) fn segment_len(len: usize, n: usize) -> usize {
    assert!(n > 0, "batch: batch size must be positive");
    assert_eq!(
        len % n,
        0,
        "batch: input length {len} is not divisible by batch size {n}"
    );
    len / n
}

/// Batches any [`Func`]/[`RFunc`] by applying it to each segment in turn.
///
/// The packed input is pooled first, so the per-segment slices share one
/// backward call into it.
///
/// # Example
///
/// ```
/// use autofunc::batch::{Batcher, FuncBatcher};
/// use autofunc::ops::Exp;
/// use autofunc::{Context, constant};
///
/// let ctx = Context::default();
/// let out = FuncBatcher(Exp).batch(&ctx, &constant(vec![0.0, 0.0, 0.0, 0.0]), 2);
/// assert_eq!(out.output(), &[1.0; 4]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct FuncBatcher<F>(pub F);

impl<F: Func> Batcher for FuncBatcher<F> {
    fn batch(&self, ctx: &Context, input: &NodeRef, n: usize) -> NodeRef {
        let seg = segment_len(input.output().len(), n);
        pool(ctx, input, |packed| {
            let parts: Vec<NodeRef> = (0..n)
                .map(|i| self.0.apply(ctx, &slice(ctx, packed, i * seg, (i + 1) * seg)))
                .collect();
            concat(ctx, &parts)
        })
    }
}

impl<F: RFunc> RBatcher for FuncBatcher<F> {
    fn batch_r(&self, ctx: &Context, rv: &RVector, input: &RNodeRef, n: usize) -> RNodeRef {
        let seg = segment_len(input.output().len(), n);
        pool_r(ctx, input, |packed| {
            let parts: Vec<RNodeRef> = (0..n)
                .map(|i| {
                    self.0
                        .apply_r(ctx, rv, &slice_r(ctx, packed, i * seg, (i + 1) * seg))
                })
                .collect();
            concat_r(ctx, &parts)
        })
    }
}
