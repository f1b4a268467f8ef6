//! Instance State Module
//!
//! Concurrent in-memory instance state with best-effort durable persistence.

pub mod persist;
pub mod registry;
pub mod store;

pub use persist::*;
pub use registry::*;
pub use store::*;
