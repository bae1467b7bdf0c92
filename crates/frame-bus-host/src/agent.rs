//! Host agent: the shell-side inbound message listener.

use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use frame_bus_core::{
    BroadcastEnvelope, Frame, FrameHandle, Inbound, ReplyEnvelope, RequestEnvelope, WireMessage,
    envelope::ApiName,
};

use crate::dispatch::{DispatchTable, OperationHandler, OperationKind};
use crate::registry::ConnectionRegistry;
use crate::user::{SessionInfoHandler, UserInfoHandler, UserInfoProvider};

/// Builder for a `HostAgent`.
///
/// All dispatchable state is injected here; nothing is process-global, so
/// independent hosts can coexist (one per test, or per shell instance).
pub struct HostAgentBuilder {
    origin: String,
    allowed_origins: Option<HashSet<String>>,
    user_provider: Option<Arc<dyn UserInfoProvider>>,
    builtins: Vec<(ApiName, Arc<dyn OperationHandler>)>,
    events: Vec<(String, Arc<dyn OperationHandler>)>,
}

impl HostAgentBuilder {
    #[must_use]
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            allowed_origins: None,
            user_provider: None,
            builtins: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Serve the built-in `user.getInfo` / `user.getSessionInfo` queries
    /// from this provider.
    #[must_use]
    pub fn user_provider(mut self, provider: Arc<dyn UserInfoProvider>) -> Self {
        self.user_provider = Some(provider);
        self
    }

    /// Restrict inbound requests to the given origins. Requests from any
    /// other origin are dropped without a reply. Without an allow-list the
    /// host accepts requests from every origin.
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allowed_origins
            .get_or_insert_with(HashSet::new)
            .insert(origin.into());
        self
    }

    /// Register an additional built-in operation handler.
    #[must_use]
    pub fn operation(mut self, name: ApiName, handler: Arc<dyn OperationHandler>) -> Self {
        self.builtins.push((name, handler));
        self
    }

    /// Register an event-bus handler at construction time.
    #[must_use]
    pub fn event(mut self, name: impl Into<String>, handler: Arc<dyn OperationHandler>) -> Self {
        self.events.push((name.into(), handler));
        self
    }

    /// Build the agent and start its listener.
    #[must_use]
    pub fn build(self) -> HostAgent {
        let mut dispatch = DispatchTable::new();
        if let Some(provider) = self.user_provider {
            dispatch.register_builtin(
                ApiName::UserGetInfo,
                Arc::new(UserInfoHandler(Arc::clone(&provider))),
            );
            dispatch.register_builtin(
                ApiName::UserGetSessionInfo,
                Arc::new(SessionInfoHandler(provider)),
            );
        }
        for (name, handler) in self.builtins {
            dispatch.register_builtin(name, handler);
        }
        for (name, handler) in self.events {
            dispatch.register_event(name, handler);
        }

        let frame = Frame::new(self.origin);
        let inner = Arc::new(HostInner {
            handle: frame.handle(),
            registry: ConnectionRegistry::new(),
            dispatch,
            allowed_origins: self.allowed_origins,
        });

        let listener = tokio::spawn(listen(Arc::clone(&inner), frame));
        HostAgent {
            inner,
            listener: Mutex::new(Some(listener)),
        }
    }
}

struct HostInner {
    handle: FrameHandle,
    registry: ConnectionRegistry,
    dispatch: DispatchTable,
    allowed_origins: Option<HashSet<String>>,
}

/// Shell-side bus endpoint.
///
/// Owns the connection registry and dispatch table; handles every inbound
/// request on its own listener task and replies to the originating frame
/// only. Handler failures become failure replies, never listener crashes.
pub struct HostAgent {
    inner: Arc<HostInner>,
    listener: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HostAgent {
    /// Start building a host for the given shell origin.
    #[must_use]
    pub fn builder(origin: impl Into<String>) -> HostAgentBuilder {
        HostAgentBuilder::new(origin)
    }

    /// Handle children use to post requests to this host.
    #[must_use]
    pub fn handle(&self) -> FrameHandle {
        self.inner.handle.clone()
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        self.inner.handle.origin()
    }

    /// Register an event-bus handler at runtime. Handlers live for the
    /// lifetime of the host; there is no removal path.
    pub fn register_event_handler(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn OperationHandler>,
    ) {
        self.inner.dispatch.register_event(name, handler);
    }

    /// Post a fire-and-forget broadcast to every attached frame.
    ///
    /// No correlation, no replies; unreachable frames are pruned.
    pub fn send_to_all(&self, event: &BroadcastEnvelope) {
        for frame in self.inner.registry.handles() {
            if frame
                .post(&self.inner.handle, WireMessage::Broadcast(event.clone()))
                .is_err()
            {
                tracing::debug!(origin = frame.origin(), "broadcast dropped, frame gone");
            }
        }
    }

    /// Whether a sub-application is currently attached under `app_key`.
    #[must_use]
    pub fn is_attached(&self, app_key: &str) -> bool {
        self.inner.registry.contains(app_key)
    }

    /// Number of attached sub-applications.
    #[must_use]
    pub fn attached_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Stop the listener and forget all connections. Idempotent.
    pub fn dispose(&self) {
        if let Some(listener) = self.listener.lock().unwrap().take() {
            listener.abort();
        }
        self.inner.registry.clear();
    }
}

impl Drop for HostAgent {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn listen(inner: Arc<HostInner>, mut frame: Frame) {
    while let Some(Inbound { source, message }) = frame.recv().await {
        match message {
            WireMessage::Request(req) => inner.handle_request(&source, req).await,
            WireMessage::Reply(reply) => {
                tracing::debug!(message_id = %reply.message_id, "host ignoring stray reply");
            }
            WireMessage::Broadcast(event) => {
                tracing::debug!(event = %event.event_name, "host ignoring stray broadcast");
            }
        }
    }
}

impl HostInner {
    async fn handle_request(&self, source: &FrameHandle, req: RequestEnvelope) {
        if let Some(allowed) = &self.allowed_origins {
            if !allowed.contains(source.origin()) {
                tracing::warn!(
                    origin = source.origin(),
                    app_key = %req.app_key,
                    "dropping request from disallowed origin"
                );
                return;
            }
        }

        let app_key = req.app_key.clone();
        let reply = self.process(source, req).await;
        if source
            .post(&self.handle, WireMessage::Reply(reply))
            .is_err()
        {
            tracing::debug!(app_key, "reply dropped, frame gone");
        }
    }

    async fn process(&self, source: &FrameHandle, req: RequestEnvelope) -> ReplyEnvelope {
        let kind = match OperationKind::resolve(&req) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(app_key = %req.app_key, error = %e, "unresolvable request");
                return ReplyEnvelope::failure(req.message_id, req.app_key, e.to_string());
            }
        };

        let RequestEnvelope {
            message_id,
            app_key,
            data,
            ..
        } = req;

        match kind {
            OperationKind::Connect => {
                tracing::info!(%app_key, origin = source.origin(), "sub-application attached");
                self.registry.attach(&app_key, source.clone());
                ReplyEnvelope::ack(message_id, app_key)
            }
            OperationKind::Disconnect => {
                tracing::info!(%app_key, "sub-application detached");
                self.registry.detach(&app_key);
                ReplyEnvelope::ack(message_id, app_key)
            }
            kind => match self.dispatch.dispatch(&kind, data).await {
                Ok(payload) => ReplyEnvelope::success(message_id, app_key, payload),
                Err(e) => {
                    tracing::warn!(%app_key, error = %e, "operation failed");
                    ReplyEnvelope::failure(message_id, app_key, e.to_string())
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use frame_bus_core::envelope::{EVENT_NAME_KEY, Payload};
    use frame_bus_core::{BusError, Frame};

    use super::*;
    use crate::dispatch::{FnHandler, HandlerError, payload_of};
    use crate::user::{StaticUserProvider, UserInfo};

    fn test_host() -> HostAgent {
        let user = UserInfo {
            id: "u1".into(),
            name: "Alice".into(),
            avatar: String::new(),
        };
        HostAgent::builder("https://cloud.example")
            .user_provider(Arc::new(StaticUserProvider::new(user, "tok-1")))
            .build()
    }

    fn connect_request(app_key: &str) -> RequestEnvelope {
        RequestEnvelope::new(ApiName::SystemConnect, app_key, "", Payload::new())
    }

    /// Post `req` from `child` and wait for the correlated reply.
    async fn roundtrip(host: &HostAgent, child: &mut Frame, req: RequestEnvelope) -> ReplyEnvelope {
        let id = req.message_id;
        host.handle()
            .post(&child.handle(), WireMessage::Request(req))
            .unwrap();
        loop {
            match child.recv().await.expect("channel open") {
                Inbound {
                    message: WireMessage::Reply(reply),
                    ..
                } if reply.message_id == id => return reply,
                _ => {}
            }
        }
    }

    async fn attach(host: &HostAgent, child: &mut Frame, app_key: &str) {
        let reply = roundtrip(host, child, connect_request(app_key)).await;
        assert!(reply.success);
    }

    #[tokio::test]
    async fn test_connect_then_disconnect_symmetry() {
        let host = test_host();
        let mut child = Frame::new("https://db.example");

        attach(&host, &mut child, "db-console").await;
        assert!(host.is_attached("db-console"));

        let reply = roundtrip(
            &host,
            &mut child,
            RequestEnvelope::new(ApiName::SystemDisconnect, "db-console", "", Payload::new()),
        )
        .await;
        assert!(reply.success);
        assert!(!host.is_attached("db-console"));

        // A broadcast after detach must not reach the child.
        host.send_to_all(&BroadcastEnvelope::new("change-i18n", Payload::new()));
        let pending = tokio::time::timeout(Duration::from_millis(50), child.recv()).await;
        assert!(pending.is_err(), "detached child received a broadcast");
    }

    #[tokio::test]
    async fn test_unknown_operation_reply() {
        let host = test_host();
        let mut child = Frame::new("https://db.example");
        attach(&host, &mut child, "db-console").await;

        let reply = roundtrip(
            &host,
            &mut child,
            RequestEnvelope::new(
                ApiName::Other("billing.getInvoice".into()),
                "db-console",
                "",
                Payload::new(),
            ),
        )
        .await;
        assert!(!reply.success);
        assert!(reply.message.unwrap().starts_with("unknown operation"));
    }

    #[tokio::test]
    async fn test_user_get_info_builtin() {
        let host = test_host();
        let mut child = Frame::new("https://db.example");
        attach(&host, &mut child, "db-console").await;

        let reply = roundtrip(
            &host,
            &mut child,
            RequestEnvelope::new(ApiName::UserGetInfo, "db-console", "", Payload::new()),
        )
        .await;
        assert!(reply.success);
        let data = reply.data.unwrap();
        assert_eq!(data["id"], "u1");
        assert_eq!(data["name"], "Alice");
        assert_eq!(data["avatar"], "");
    }

    #[tokio::test]
    async fn test_event_bus_runtime_registration() {
        let host = test_host();
        let mut child = Frame::new("https://launchpad.example");
        attach(&host, &mut child, "launchpad").await;

        host.register_event_handler(
            "get-apps",
            Arc::new(FnHandler(|_payload: Payload| async {
                payload_of(&json!({ "apps": ["terminal"] }))
            })),
        );

        let mut data = Payload::new();
        data.insert(EVENT_NAME_KEY.into(), json!("get-apps"));
        let reply = roundtrip(
            &host,
            &mut child,
            RequestEnvelope::new(ApiName::EventBus, "launchpad", "", data),
        )
        .await;
        assert!(reply.success);
        assert_eq!(reply.data.unwrap()["apps"], json!(["terminal"]));
    }

    #[tokio::test]
    async fn test_event_bus_missing_event_name() {
        let host = test_host();
        let mut child = Frame::new("https://launchpad.example");
        attach(&host, &mut child, "launchpad").await;

        let reply = roundtrip(
            &host,
            &mut child,
            RequestEnvelope::new(ApiName::EventBus, "launchpad", "", Payload::new()),
        )
        .await;
        assert!(!reply.success);
        assert!(reply.message.unwrap().contains("eventName"));
    }

    #[tokio::test]
    async fn test_handler_failure_keeps_listener_alive() {
        let host = test_host();
        host.register_event_handler(
            "flaky",
            Arc::new(FnHandler(|_payload: Payload| async {
                Err::<Payload, _>(HandlerError::msg("backend unavailable"))
            })),
        );
        let mut child = Frame::new("https://db.example");
        attach(&host, &mut child, "db-console").await;

        let mut data = Payload::new();
        data.insert(EVENT_NAME_KEY.into(), json!("flaky"));
        let reply = roundtrip(
            &host,
            &mut child,
            RequestEnvelope::new(ApiName::EventBus, "db-console", "", data),
        )
        .await;
        assert!(!reply.success);
        assert_eq!(reply.message.unwrap(), "backend unavailable");

        // The listener must still serve subsequent requests.
        let reply = roundtrip(
            &host,
            &mut child,
            RequestEnvelope::new(ApiName::UserGetInfo, "db-console", "", Payload::new()),
        )
        .await;
        assert!(reply.success);
    }

    #[tokio::test]
    async fn test_broadcast_fan_out() {
        let host = test_host();
        let event = BroadcastEnvelope::new("change-i18n", Payload::new());

        // Zero children: nothing to do, nothing to panic over.
        host.send_to_all(&event);

        let mut children = Vec::new();
        for i in 0..3 {
            let mut child = Frame::new(format!("https://app{i}.example"));
            attach(&host, &mut child, format!("app-{i}").as_str()).await;
            children.push(child);
        }
        assert_eq!(host.attached_count(), 3);

        host.send_to_all(&event);
        for child in &mut children {
            let inbound = child.recv().await.unwrap();
            match inbound.message {
                WireMessage::Broadcast(b) => assert_eq!(b.event_name, "change-i18n"),
                other => panic!("expected broadcast, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_reply_goes_to_source_only() {
        let host = test_host();
        let mut asking = Frame::new("https://db.example");
        let mut bystander = Frame::new("https://terminal.example");
        attach(&host, &mut asking, "db-console").await;
        attach(&host, &mut bystander, "terminal").await;

        let reply = roundtrip(
            &host,
            &mut asking,
            RequestEnvelope::new(ApiName::UserGetInfo, "db-console", "", Payload::new()),
        )
        .await;
        assert!(reply.success);

        let stray = tokio::time::timeout(Duration::from_millis(50), bystander.recv()).await;
        assert!(stray.is_err(), "bystander received someone else's reply");
    }

    #[tokio::test]
    async fn test_origin_allow_list_drops_silently() {
        let user = UserInfo {
            id: "u1".into(),
            name: "Alice".into(),
            avatar: String::new(),
        };
        let host = HostAgent::builder("https://cloud.example")
            .user_provider(Arc::new(StaticUserProvider::new(user, "tok-1")))
            .allow_origin("https://db.example")
            .build();

        let mut trusted = Frame::new("https://db.example");
        attach(&host, &mut trusted, "db-console").await;

        let mut hostile = Frame::new("https://evil.example");
        host.handle()
            .post(&hostile.handle(), WireMessage::Request(connect_request("evil")))
            .unwrap();

        let silent = tokio::time::timeout(Duration::from_millis(50), hostile.recv()).await;
        assert!(silent.is_err(), "disallowed origin got a reply");
        assert!(!host.is_attached("evil"));
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent_and_stops_listener() {
        let host = test_host();
        let mut child = Frame::new("https://db.example");
        attach(&host, &mut child, "db-console").await;

        host.dispose();
        host.dispose();
        assert_eq!(host.attached_count(), 0);

        // Posting still succeeds (handle alive) but nothing answers.
        let _ = host
            .handle()
            .post(&child.handle(), WireMessage::Request(connect_request("db-console")));
        let silent = tokio::time::timeout(Duration::from_millis(50), child.recv()).await;
        assert!(silent.is_err());
    }

    #[tokio::test]
    async fn test_two_hosts_are_independent() {
        let a = test_host();
        let b = test_host();
        let mut child = Frame::new("https://db.example");

        attach(&a, &mut child, "db-console").await;
        assert!(a.is_attached("db-console"));
        assert!(!b.is_attached("db-console"));
    }

    #[test]
    fn test_bus_error_display_is_reusable() {
        // Failure replies surfaced through BusError keep their message.
        let reply = ReplyEnvelope::failure(uuid::Uuid::new_v4(), "a", "unknown operation: x");
        let err = BusError::Failed(reply);
        assert!(err.to_string().contains("unknown operation: x"));
    }
}
