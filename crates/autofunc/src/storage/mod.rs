//! Buffer storage and the vector-reuse cache.
//!
//! ```text
//! Context ──Arc──► VectorCache (Mutex<buckets by length>)
//!    │                  ▲
//!    ▼ alloc            │ free on Drop
//!  Buffer ──────────────┘
//! ```

mod buffer;
mod cache;
mod context;

pub use buffer::Buffer;
pub use cache::{CacheConfig, CacheStats, DEFAULT_MAX_FLOATS, VectorCache};
pub use context::Context;
