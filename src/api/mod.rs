//! API Module
//!
//! HTTP surface used by booting instances to register and fetch their
//! configuration, and by orchestrators to assign configuration and list
//! known instances.

pub mod rest;
pub mod server;

pub use rest::*;
pub use server::*;
