//! Core building blocks for the cross-frame application bus.
//!
//! This crate provides the pieces shared by both ends of the bus:
//! - `envelope` - Wire envelopes (request, reply, broadcast)
//! - `ledger` - Correlation and timeout tracking for pending requests
//! - `frame` - In-memory frame channel with sender identity
//! - `BusError` - Error taxonomy surfaced to callers

pub mod envelope;
pub mod error;
pub mod frame;
pub mod ledger;

pub use envelope::{ApiName, BroadcastEnvelope, Payload, ReplyEnvelope, RequestEnvelope, WireMessage};
pub use error::{BusError, LedgerError};
pub use frame::{Frame, FrameHandle, Inbound};
pub use ledger::{PendingLedger, Settlement};
