//! Sub-application-side endpoint of the cross-frame application bus.
//!
//! A `ChildAgent` runs inside an embedded sub-application frame. It calls
//! named operations on the hosting shell via `invoke`, receives shell-wide
//! broadcasts through `subscribe`, and manages the attach/detach lifecycle.

pub mod agent;

pub use agent::{ChildAgent, ChildAgentConfig, DEFAULT_TIMEOUT};
