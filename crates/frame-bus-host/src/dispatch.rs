//! Operation dispatch table and event-bus tier.

use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use frame_bus_core::envelope::{ApiName, EVENT_NAME_KEY, Payload, RequestEnvelope};

/// Failure reported by an operation handler; carried back to the caller
/// as a `success:false` reply.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Dispatch error.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler registered under the requested name.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    /// An event-bus request did not carry `data.eventName`.
    #[error("event-bus request is missing eventName")]
    MissingEventName,
    /// The handler itself failed.
    #[error("{0}")]
    Handler(String),
}

/// A named operation handler.
///
/// Implement this for stateful handlers; use `FnHandler` for closures.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, payload: Payload) -> Result<Payload, HandlerError>;
}

/// Adapter turning an async closure into an `OperationHandler`.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(Payload) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Payload, HandlerError>> + Send + 'static,
{
    async fn handle(&self, payload: Payload) -> Result<Payload, HandlerError> {
        (self.0)(payload).await
    }
}

/// Serialize a value into an envelope payload.
///
/// # Errors
/// Fails if the value does not serialize to a JSON object.
pub fn payload_of<T: Serialize>(value: &T) -> Result<Payload, HandlerError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HandlerError::msg(format!(
            "payload must be a JSON object, got {other}"
        ))),
        Err(e) => Err(HandlerError::msg(e.to_string())),
    }
}

/// How a request envelope is to be handled, resolved once per message.
///
/// Keeps the closed set of built-ins statically distinguishable from the
/// open set of event-bus names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// `system.connect` lifecycle handshake.
    Connect,
    /// `system.disconnect` lifecycle notification.
    Disconnect,
    /// A fixed built-in operation.
    BuiltIn(ApiName),
    /// A dynamically registered event-bus operation.
    EventBus(String),
}

impl OperationKind {
    /// Resolve a request envelope into its operation kind.
    ///
    /// # Errors
    /// Returns `MissingEventName` for an `event-bus` request without
    /// `data.eventName`.
    pub fn resolve(req: &RequestEnvelope) -> Result<Self, DispatchError> {
        match &req.api_name {
            ApiName::SystemConnect => Ok(Self::Connect),
            ApiName::SystemDisconnect => Ok(Self::Disconnect),
            ApiName::EventBus => req
                .data
                .get(EVENT_NAME_KEY)
                .and_then(Value::as_str)
                .map(|name| Self::EventBus(name.to_string()))
                .ok_or(DispatchError::MissingEventName),
            other => Ok(Self::BuiltIn(other.clone())),
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Connect => ApiName::SystemConnect.to_string(),
            Self::Disconnect => ApiName::SystemDisconnect.to_string(),
            Self::BuiltIn(api) => api.to_string(),
            Self::EventBus(event) => event.clone(),
        }
    }
}

/// Two-tier name-to-handler registry.
///
/// Built-ins are fixed at construction; event handlers may be registered
/// at any time and live for the lifetime of the table (no removal path).
#[derive(Default)]
pub struct DispatchTable {
    builtins: HashMap<ApiName, Arc<dyn OperationHandler>>,
    events: RwLock<HashMap<String, Arc<dyn OperationHandler>>>,
}

impl DispatchTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a built-in handler. Construction-time only.
    pub fn register_builtin(&mut self, name: ApiName, handler: Arc<dyn OperationHandler>) {
        self.builtins.insert(name, handler);
    }

    /// Register an event-bus handler under `event`. Later registrations
    /// under the same name replace earlier ones.
    pub fn register_event(&self, event: impl Into<String>, handler: Arc<dyn OperationHandler>) {
        self.events.write().unwrap().insert(event.into(), handler);
    }

    #[must_use]
    pub fn has_event(&self, event: &str) -> bool {
        self.events.read().unwrap().contains_key(event)
    }

    /// Invoke the handler for `kind` with `payload`.
    ///
    /// # Errors
    /// `UnknownOperation` if nothing is registered under the name; handler
    /// failures come back as `DispatchError::Handler`.
    pub async fn dispatch(
        &self,
        kind: &OperationKind,
        payload: Payload,
    ) -> Result<Payload, DispatchError> {
        let handler = match kind {
            OperationKind::BuiltIn(name) => self.builtins.get(name).cloned(),
            OperationKind::EventBus(event) => self.events.read().unwrap().get(event).cloned(),
            // Lifecycle operations are the host agent's own, never table-dispatched.
            OperationKind::Connect | OperationKind::Disconnect => None,
        };

        let handler = handler.ok_or_else(|| DispatchError::UnknownOperation(kind.name()))?;
        handler
            .handle(payload)
            .await
            .map_err(|e| DispatchError::Handler(e.to_string()))
    }
}
