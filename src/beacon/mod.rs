//! Discovery Beacon Module
//!
//! Subnet broadcast beacon that lets booting instances find the listener.

pub mod address;
pub mod broadcaster;

pub use address::*;
pub use broadcaster::*;
