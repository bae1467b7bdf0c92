//! Shell-side endpoint of the cross-frame application bus.
//!
//! The `HostAgent` listens on its own frame inbox, tracks attached
//! sub-applications in a `ConnectionRegistry`, dispatches named operations
//! through a two-tier `DispatchTable` (fixed built-ins plus a runtime
//! event-bus tier) and broadcasts fire-and-forget notifications to every
//! attached frame.

pub mod agent;
pub mod dispatch;
pub mod registry;
pub mod user;

pub use agent::{HostAgent, HostAgentBuilder};
pub use dispatch::{
    DispatchError, DispatchTable, FnHandler, HandlerError, OperationHandler, OperationKind,
    payload_of,
};
pub use registry::{ConnectionEntry, ConnectionRegistry};
pub use user::{SessionInfo, StaticUserProvider, UserInfo, UserInfoProvider};
