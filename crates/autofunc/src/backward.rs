//! Entry points for backward passes.

use crate::gradient::{Gradient, RGradient};
use crate::node::{Node, RNode};

/// Run a backward pass from `node` with adjoint `upstream`.
///
/// Gradients are summed into the entries already present in `grad`; create
/// them with [`Gradient::for_vars`]. Nothing happens if `node` is constant
/// with respect to `grad`.
///
/// # Panics
///
/// Panics if `upstream` does not match the node's output length.
///
/// # Example
///
/// ```
/// use autofunc::{Context, Gradient, Variable, backward, ops};
///
/// let ctx = Context::default();
/// let x = Variable::new(vec![1.0, 2.0]);
/// let y = ops::square(&ctx, &x.node());
///
/// let mut grad = Gradient::for_vars([&x]);
/// backward(y.as_ref(), &[1.0, 1.0], &mut grad);
/// assert_eq!(grad.get(x.id()).unwrap(), &[2.0, 4.0]);
/// ```
pub fn backward(node: &dyn Node, upstream: &[f64], grad: &mut Gradient) {
    assert_eq!(
        upstream.len(),
        node.output().len(),
        "backward: upstream has length {}, output has length {}",
        upstream.len(),
        node.output().len()
    );
    if node.constant(grad) {
        return;
    }
    let mut upstream = upstream.to_vec();
    node.propagate_gradient(&mut upstream, grad);
}

/// Run an R backward pass from `node`.
///
/// `rgrad` receives the directional derivative of the gradient; `grad`, if
/// given, receives the gradient itself.
///
/// # Panics
///
/// Panics if either upstream vector does not match the output length.
pub fn backward_r(
    node: &dyn RNode,
    upstream: &[f64],
    upstream_r: &[f64],
    rgrad: &mut RGradient,
    grad: Option<&mut Gradient>,
) {
    let len = node.output().len();
    assert_eq!(
        upstream.len(),
        len,
        "backward_r: upstream has length {}, output has length {len}",
        upstream.len()
    );
    assert_eq!(
        upstream_r.len(),
        len,
        "backward_r: upstream tangent has length {}, output has length {len}",
        upstream_r.len()
    );
    if node.constant(rgrad, grad.as_deref()) {
        return;
    }
    let mut upstream = upstream.to_vec();
    let mut upstream_r = upstream_r.to_vec();
    node.propagate_r_gradient(&mut upstream, &mut upstream_r, rgrad, grad);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::RVector;
    use crate::storage::Context;
    use crate::variable::Variable;
    use crate::{constant, ops};

    #[test]
    fn test_backward_chain() {
        let ctx = Context::default();
        let x = Variable::new(vec![1.0]);
        let y = ops::scale(&ctx, &ops::scale(&ctx, &x.node(), 2.0), 3.0);

        let mut grad = Gradient::for_vars([&x]);
        backward(y.as_ref(), &[1.0], &mut grad);
        assert_eq!(grad.get(x.id()).unwrap(), &[6.0]);
    }

    #[test]
    fn test_backward_constant_is_noop() {
        let ctx = Context::default();
        let x = Variable::new(vec![1.0]);
        let y = ops::add(&ctx, &constant(vec![1.0]), &constant(vec![2.0]));
        let mut grad = Gradient::for_vars([&x]);
        backward(y.as_ref(), &[1.0], &mut grad);
        assert_eq!(grad.get(x.id()).unwrap(), &[0.0]);
    }

    #[test]
    #[should_panic(expected = "upstream has length 2")]
    fn test_backward_length_mismatch() {
        let x = Variable::new(vec![1.0]);
        let mut grad = Gradient::for_vars([&x]);
        backward(x.node().as_ref(), &[1.0, 1.0], &mut grad);
    }

    #[test]
    fn test_backward_r_without_gradient() {
        let ctx = Context::default();
        let x = Variable::new(vec![3.0]);
        let mut rv = RVector::new();
        rv.insert(x.id(), vec![1.0]);

        // d/dt of d(x^2)/dx along v=1 is 2.
        let y = ops::square_r(&ctx, &x.r_node(&rv));
        let mut rgrad = Gradient::for_vars([&x]);
        backward_r(y.as_ref(), &[1.0], &[0.0], &mut rgrad, None);
        assert_eq!(rgrad.get(x.id()).unwrap(), &[2.0]);
    }
}
