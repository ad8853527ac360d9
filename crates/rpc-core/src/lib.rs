//! # rmedia rpc-core
//!
//! Client-facing request handling for the rmedia control plane.
//!
//! - [`protocol`]: request, response and notification shapes with stable error codes
//! - [`facade`]: [`RpcFacade`] dispatching operations onto the media server
//! - [`session`]: client sessions and the [`SessionEventSink`] pushing events to them
//!
//! The transport owns the socket: it opens a session per client, feeds
//! decoded requests to [`RpcFacade::handle`], writes responses back and
//! drains the session's notification receiver.

pub mod error;
pub mod facade;
pub mod protocol;
pub mod session;

pub use error::{Result, RpcError};
pub use facade::RpcFacade;
pub use protocol::{error_codes, ErrorObject, RpcNotification, RpcRequest, RpcResponse, EVENT_METHOD, JSONRPC_VERSION};
pub use session::{ClientSession, SessionEventSink, SessionRegistry, DEFAULT_OUTBOUND_CAPACITY};

/// Commonly used items
pub mod prelude {
    pub use crate::error::RpcError;
    pub use crate::facade::RpcFacade;
    pub use crate::protocol::{error_codes, RpcNotification, RpcRequest, RpcResponse};
    pub use crate::session::{ClientSession, SessionEventSink, SessionRegistry};
}
