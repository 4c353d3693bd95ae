//! Vector operations.
//!
//! Every operation comes in two forms: a value form over [`NodeRef`]s and an
//! `_r` form over [`RNodeRef`]s that also carries the forward tangent.
//!
//! ```text
//! arith       add, sub, mul, div
//! scale       scale, add_scaler, scale_first, add_first
//! power       pow, inverse, square
//! reduce      sum_all
//! elementwise exp, log (also as the Exp / Log funcs)
//! log_domain  add_log_domain, sum_all_log_domain
//! slice       slice, concat, repeat
//! ```
//!
//! [`NodeRef`]: crate::NodeRef
//! [`RNodeRef`]: crate::RNodeRef

mod arith;
mod elementwise;
mod log_domain;
mod power;
mod reduce;
mod scale;
mod slice;

pub use arith::{add, add_r, div, div_r, mul, mul_r, sub, sub_r};
pub use elementwise::{Exp, Log, exp, exp_r, log, log_r};
pub use log_domain::{
    add_log_domain, add_log_domain_r, sum_all_log_domain, sum_all_log_domain_r,
};
pub use power::{inverse, inverse_r, pow, pow_r, square, square_r};
pub use reduce::{sum_all, sum_all_r};
pub use scale::{
    add_first, add_first_r, add_scaler, add_scaler_r, scale, scale_first, scale_first_r,
    scale_r,
};
pub use slice::{concat, concat_r, repeat, repeat_r, slice, slice_r};

pub(crate) use scale::dot;
