//! autofunc - automatic differentiation over flat `f64` vectors
//!
//! Graphs are built eagerly: every operation computes its output when the
//! node is created. A backward pass then pushes adjoints from a root node to
//! the leaf [`Variable`]s, skipping any subgraph that cannot reach a leaf the
//! caller asked about.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Leaves
//!     → Variable (identity + values), constant
//!
//! Level 2: Nodes (eager forward, recursive backward)
//!     → ops: arith, scale, power, reduce, exp/log, log-domain, slice/concat/repeat
//!     → linalg: mat_mul, mat_vec, outer, transpose, scale_rows
//!     → every op has an `_r` twin carrying the forward tangent (R-operator)
//!
//! Level 3: Graph structure
//!     → pool (collect a node's adjoint once), fold (checkpointed recurrence)
//!     → batch (apply a function to packed inputs)
//!
//! Level 4: Storage
//!     → Context → VectorCache (length-bucketed buffer reuse)
//! ```
//!
//! # Example
//!
//! ```
//! use autofunc::{Context, Gradient, Variable, backward, ops};
//!
//! let ctx = Context::default();
//! let x = Variable::new(vec![1.0, 2.0, 3.0]);
//! let y = Variable::new(vec![4.0, 5.0, 6.0]);
//!
//! // f = sum(x * y)
//! let f = ops::sum_all(&ctx, &ops::mul(&ctx, &x.node(), &y.node()));
//! assert_eq!(f.output(), &[32.0]);
//!
//! let mut grad = Gradient::for_vars([&x, &y]);
//! backward(f.as_ref(), &[1.0], &mut grad);
//! assert_eq!(grad.get(x.id()).unwrap(), y.vector());
//! assert_eq!(grad.get(y.id()).unwrap(), x.vector());
//! ```

mod backward;
pub mod batch;
mod error;
pub mod fold;
mod gradient;
mod hessian;
mod leaf;
mod leaf_set;
pub mod linalg;
mod node;
pub mod ops;
pub mod pool;
mod random;
mod serialization;
pub mod storage;
mod variable;

pub use backward::{backward, backward_r};
pub use error::SerializeError;
pub use gradient::{Gradient, RGradient, RVector};
pub use hessian::hessian_vector_product;
pub use leaf::{constant, constant_r};
pub use leaf_set::LeafSet;
pub use node::{Func, Node, NodeRef, RFunc, RNode, RNodeRef, release};
pub use storage::{Buffer, CacheConfig, CacheStats, Context, VectorCache};
pub use variable::{VarId, Variable};
