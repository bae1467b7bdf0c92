//! Error taxonomy surfaced to bus callers.

use thiserror::Error;
use uuid::Uuid;

use crate::envelope::ReplyEnvelope;

/// Bus error surfaced to sub-application callers.
///
/// None of these are retried by the bus itself; retry policy, if any,
/// belongs to the caller.
#[derive(Debug, Error)]
pub enum BusError {
    /// The frame has no reachable parent; no message was sent.
    #[error("frame is not embedded in a parent shell")]
    NotEmbedded,
    /// `invoke` was called before the connect handshake completed.
    #[error("agent is not attached to the shell")]
    NotAttached,
    /// No correlated reply arrived within the deadline.
    #[error("request timed out")]
    Timeout,
    /// The agent was disposed while the request was in flight.
    #[error("agent disposed")]
    Disposed,
    /// The host reported failure; the full reply is carried.
    #[error("operation failed: {}", .0.message.as_deref().unwrap_or("unspecified"))]
    Failed(ReplyEnvelope),
    /// The frame channel to the peer is gone.
    #[error("frame channel closed")]
    ChannelClosed,
    /// Correlation ledger rejected the request.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Correlation ledger error.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// An entry for this id is already pending. Given v4 `messageId`
    /// generation this indicates a caller bug, not a protocol violation.
    #[error("duplicate pending message id: {0}")]
    DuplicateId(Uuid),
}
