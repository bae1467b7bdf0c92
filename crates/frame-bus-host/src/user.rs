//! Built-in user and session query handlers.
//!
//! The bus only defines the seam; the shell implements `UserInfoProvider`
//! against whatever session store it actually has.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use frame_bus_core::Payload;

use crate::dispatch::{HandlerError, OperationHandler, payload_of};

/// Current user as exposed to sub-applications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub avatar: String,
}

/// Session descriptor exposed to sub-applications (`user.getSessionInfo`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub token: String,
    pub user: UserInfo,
}

/// Source of user/session data for the built-in query operations.
#[async_trait]
pub trait UserInfoProvider: Send + Sync {
    async fn user_info(&self) -> Result<UserInfo, HandlerError>;

    async fn session_info(&self) -> Result<SessionInfo, HandlerError>;
}

/// Provider backed by a fixed session, for demos and tests.
#[derive(Debug, Clone)]
pub struct StaticUserProvider {
    session: SessionInfo,
}

impl StaticUserProvider {
    #[must_use]
    pub fn new(user: UserInfo, token: impl Into<String>) -> Self {
        Self {
            session: SessionInfo {
                token: token.into(),
                user,
            },
        }
    }
}

#[async_trait]
impl UserInfoProvider for StaticUserProvider {
    async fn user_info(&self) -> Result<UserInfo, HandlerError> {
        Ok(self.session.user.clone())
    }

    async fn session_info(&self) -> Result<SessionInfo, HandlerError> {
        Ok(self.session.clone())
    }
}

/// `user.getInfo` handler over a provider.
pub(crate) struct UserInfoHandler(pub Arc<dyn UserInfoProvider>);

#[async_trait]
impl OperationHandler for UserInfoHandler {
    async fn handle(&self, _payload: Payload) -> Result<Payload, HandlerError> {
        payload_of(&self.0.user_info().await?)
    }
}

/// `user.getSessionInfo` handler over a provider.
pub(crate) struct SessionInfoHandler(pub Arc<dyn UserInfoProvider>);

#[async_trait]
impl OperationHandler for SessionInfoHandler {
    async fn handle(&self, _payload: Payload) -> Result<Payload, HandlerError> {
        payload_of(&self.0.session_info().await?)
    }
}
