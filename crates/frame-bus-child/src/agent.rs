//! Child agent: the sub-application-side caller.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use serde_json::json;
use tokio::sync::broadcast;

use frame_bus_core::{
    BroadcastEnvelope, BusError, Frame, FrameHandle, Inbound, PendingLedger, RequestEnvelope,
    WireMessage,
    envelope::{ApiName, EVENT_NAME_KEY, Payload},
};

/// Default deadline for a correlated request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Child agent configuration, supplied by the embedding sub-application.
#[derive(Debug, Clone)]
pub struct ChildAgentConfig {
    /// Identifying key of this sub-application.
    pub app_key: String,
    /// Location (URL) of this frame, informational.
    pub client_location: String,
    /// Per-request deadline.
    pub timeout: Duration,
}

impl ChildAgentConfig {
    #[must_use]
    pub fn new(app_key: impl Into<String>) -> Self {
        Self {
            app_key: app_key.into(),
            client_location: String::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn client_location(mut self, location: impl Into<String>) -> Self {
        self.client_location = location.into();
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Messaging endpoint embedded inside a sub-application frame.
///
/// `invoke` suspends the caller until the correlated reply arrives or the
/// deadline fires; nothing else blocks. Concurrent invokes are independent
/// and may settle in either order.
pub struct ChildAgent {
    config: ChildAgentConfig,
    parent: FrameHandle,
    handle: FrameHandle,
    ledger: PendingLedger,
    broadcasts: broadcast::Sender<BroadcastEnvelope>,
    attached: AtomicBool,
    disposed: AtomicBool,
    listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ChildAgent {
    /// Create the agent and start its inbox listener. Does not perform the
    /// connect handshake; `invoke` fails with `NotAttached` until
    /// `connect` completes.
    ///
    /// # Errors
    /// `NotEmbedded` if there is no parent frame to talk to.
    pub fn new(
        config: ChildAgentConfig,
        frame: Frame,
        parent: Option<FrameHandle>,
    ) -> Result<Self, BusError> {
        let parent = parent.ok_or(BusError::NotEmbedded)?;
        let handle = frame.handle();
        let ledger = PendingLedger::new();
        let (broadcasts, _) = broadcast::channel(64);

        let listener = tokio::spawn(listen(frame, ledger.clone(), broadcasts.clone()));

        Ok(Self {
            config,
            parent,
            handle,
            ledger,
            broadcasts,
            attached: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            listener: Mutex::new(Some(listener)),
        })
    }

    /// Create, connect and return an attached agent in one call.
    ///
    /// # Errors
    /// Fails like `new` plus anything the handshake can fail with.
    pub async fn attach(
        config: ChildAgentConfig,
        frame: Frame,
        parent: Option<FrameHandle>,
    ) -> Result<Self, BusError> {
        let agent = Self::new(config, frame, parent)?;
        agent.connect().await?;
        Ok(agent)
    }

    /// Perform the `system.connect` handshake through the ordinary
    /// request/reply path and mark the agent attached.
    ///
    /// # Errors
    /// `Disposed` after teardown; `Timeout` if the shell never acks.
    pub async fn connect(&self) -> Result<(), BusError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(BusError::Disposed);
        }
        self.send_request(ApiName::SystemConnect, Payload::new())
            .await?;
        self.attached.store(true, Ordering::SeqCst);
        tracing::debug!(app_key = %self.config.app_key, "attached to shell");
        Ok(())
    }

    /// Call a named operation on the hosting shell.
    ///
    /// # Errors
    /// Fails fast with `Disposed` or `NotAttached`; otherwise settles with
    /// the reply payload, the failure reply, or `Timeout`.
    pub async fn invoke(
        &self,
        api_name: impl Into<ApiName>,
        data: Payload,
    ) -> Result<Payload, BusError> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(BusError::Disposed);
        }
        if !self.attached.load(Ordering::SeqCst) {
            return Err(BusError::NotAttached);
        }
        self.send_request(api_name.into(), data).await
    }

    /// Call a dynamically registered event-bus operation by event name.
    ///
    /// # Errors
    /// Same failure modes as `invoke`.
    pub async fn invoke_event(
        &self,
        event_name: &str,
        mut data: Payload,
    ) -> Result<Payload, BusError> {
        data.insert(EVENT_NAME_KEY.into(), json!(event_name));
        self.invoke(ApiName::EventBus, data).await
    }

    async fn send_request(&self, api_name: ApiName, data: Payload) -> Result<Payload, BusError> {
        let req = RequestEnvelope::new(
            api_name,
            &self.config.app_key,
            &self.config.client_location,
            data,
        );
        let id = req.message_id;
        let settle_rx = self.ledger.register(id, self.config.timeout)?;

        if let Err(e) = self.parent.post(&self.handle, WireMessage::Request(req)) {
            self.ledger.cancel(id);
            return Err(e);
        }

        match settle_rx.await {
            Ok(Ok(reply)) if reply.success => Ok(reply.data.unwrap_or_default()),
            Ok(Ok(reply)) => Err(BusError::Failed(reply)),
            Ok(Err(e)) => Err(e),
            // Entry cancelled or drained without settlement.
            Err(_) => Err(BusError::Disposed),
        }
    }

    /// Subscribe to shell-wide broadcasts (locale changes and the like).
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEnvelope> {
        self.broadcasts.subscribe()
    }

    /// Tear the agent down: notify the shell, stop the listener and reject
    /// every in-flight request with `Disposed`. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.attached.store(false, Ordering::SeqCst);

        // Best-effort detach notification; no entry is registered and no
        // ack is awaited.
        let bye = RequestEnvelope::new(
            ApiName::SystemDisconnect,
            &self.config.app_key,
            &self.config.client_location,
            Payload::new(),
        );
        if self.parent.post(&self.handle, WireMessage::Request(bye)).is_err() {
            tracing::debug!(app_key = %self.config.app_key, "shell gone before disconnect");
        }

        if let Some(listener) = self.listener.lock().unwrap().take() {
            listener.abort();
        }
        self.ledger.drain();
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst) && !self.disposed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn app_key(&self) -> &str {
        &self.config.app_key
    }

    /// Number of requests currently awaiting settlement.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.ledger.len()
    }
}

impl Drop for ChildAgent {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn listen(
    mut frame: Frame,
    ledger: PendingLedger,
    broadcasts: broadcast::Sender<BroadcastEnvelope>,
) {
    while let Some(Inbound { message, .. }) = frame.recv().await {
        match message {
            WireMessage::Reply(reply) => {
                let id = reply.message_id;
                if !ledger.settle(id, reply) {
                    tracing::debug!(%id, "discarding reply for unknown or settled id");
                }
            }
            WireMessage::Broadcast(event) => {
                // No subscribers is fine.
                let _ = broadcasts.send(event);
            }
            WireMessage::Request(req) => {
                tracing::debug!(api = %req.api_name, "child ignoring inbound request");
            }
        }
    }
}
