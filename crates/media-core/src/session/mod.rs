//! Connections and their negotiated sessions
//!
//! A connection belongs to one endpoint and holds at most one
//! [`NegotiatedSession`](rmedia_sdp_core::NegotiatedSession). Negotiation is
//! computed outside the connection lock; only storing the result happens
//! under it.

pub mod connection;
pub mod manager;

pub use connection::{Connection, ConnectionInfo, ConnectionState, Role};
pub use manager::{ConnectionManager, NegotiationOutcome};
