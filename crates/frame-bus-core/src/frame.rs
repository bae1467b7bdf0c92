//! In-memory frame channel.
//!
//! Models the cross-window message primitive: each frame owns an unbounded
//! inbox, and every delivered message is tagged with the sender's handle
//! (the `event.source` analogue) so the receiver can reply to the
//! originating frame only. Frames run in different tasks and share no
//! other state.

use tokio::sync::mpsc;

use crate::envelope::WireMessage;
use crate::error::BusError;

/// A message delivered to a frame's inbox, tagged with its sender.
#[derive(Debug)]
pub struct Inbound {
    /// Handle of the frame that posted the message.
    pub source: FrameHandle,
    pub message: WireMessage,
}

/// Cloneable handle for posting messages to a frame.
#[derive(Debug, Clone)]
pub struct FrameHandle {
    origin: String,
    tx: mpsc::UnboundedSender<Inbound>,
}

impl FrameHandle {
    /// Origin of the frame this handle points at.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Post a message, identifying the sender via `source`.
    ///
    /// Fire-and-forget: the only failure is a permanently gone receiver.
    ///
    /// # Errors
    /// Returns `BusError::ChannelClosed` if the target frame was dropped.
    pub fn post(&self, source: &FrameHandle, message: WireMessage) -> Result<(), BusError> {
        self.tx
            .send(Inbound {
                source: source.clone(),
                message,
            })
            .map_err(|_| BusError::ChannelClosed)
    }

    /// Whether the target frame is still able to receive.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Whether two handles point at the same frame.
    #[must_use]
    pub fn same_frame(&self, other: &FrameHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// One endpoint of the frame channel: an inbox plus the handle others use
/// to reach it.
#[derive(Debug)]
pub struct Frame {
    handle: FrameHandle,
    rx: mpsc::UnboundedReceiver<Inbound>,
}

impl Frame {
    /// Create a frame with the given origin.
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            handle: FrameHandle {
                origin: origin.into(),
                tx,
            },
            rx,
        }
    }

    /// Handle other frames use to post messages here.
    #[must_use]
    pub fn handle(&self) -> FrameHandle {
        self.handle.clone()
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        self.handle.origin()
    }

    /// Receive the next inbound message; `None` once all handles are gone.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.rx.recv().await
    }
}
