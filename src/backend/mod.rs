//! HTTP access to the function router.
//!
//! Both the worker function and the state manager sit behind the same
//! router; this module owns the client and the wire types for both.

pub mod client;
pub mod protocol;

pub use client::{RouterClient, RouterConfig};
