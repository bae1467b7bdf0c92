//! Transport layer for out-of-process sub-applications.
//!
//! Provides:
//! - WebSocket bridge (feature: websocket): each accepted socket becomes a
//!   remote child frame talking to the shell's host agent.

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "websocket")]
pub use websocket::{WsState, create_ws_router, ws_handler};
