//! Connection state machine

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use rmedia_sdp_core::{CapabilityDescription, NegotiatedSession, NegotiationResult};

use crate::types::{ConnectionId, ObjectId};

/// Connection state
///
/// `Created -> LocalSpecSet -> Negotiating -> Negotiated`, renegotiation
/// goes back through `Negotiating`, and any state may move to the terminal
/// `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Created,
    LocalSpecSet,
    Negotiating,
    Negotiated,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Created => write!(f, "created"),
            ConnectionState::LocalSpecSet => write!(f, "localSpecSet"),
            ConnectionState::Negotiating => write!(f, "negotiating"),
            ConnectionState::Negotiated => write!(f, "negotiated"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Which side of the offer/answer exchange the local description plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Role {
    /// Local description is the offer
    Offerer,
    /// Local description is the answer
    #[default]
    Answerer,
}

/// Mutable part of a connection, guarded by the connection lock
#[derive(Debug)]
pub(crate) struct ConnectionInner {
    pub state: ConnectionState,
    pub local: Option<CapabilityDescription>,
    pub remote: Option<CapabilityDescription>,
    pub session: Option<Arc<NegotiatedSession>>,
    /// Bumped each time a negotiation starts; only the latest one stores its result
    pub generation: u64,
}

/// Negotiated session state of one endpoint
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub endpoint: ObjectId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub(crate) inner: Mutex<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(endpoint: ObjectId, role: Role) -> Self {
        Self {
            id: ConnectionId::new(),
            endpoint,
            role,
            created_at: Utc::now(),
            inner: Mutex::new(ConnectionInner {
                state: ConnectionState::Created,
                local: None,
                remote: None,
                session: None,
                generation: 0,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// Current negotiated session, if any
    pub fn session(&self) -> Option<Arc<NegotiatedSession>> {
        self.inner.lock().session.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Pair a local and a remote description as (offer, answer) per role
    pub(crate) fn order<'a>(
        &self,
        local: &'a CapabilityDescription,
        remote: &'a CapabilityDescription,
    ) -> (&'a CapabilityDescription, &'a CapabilityDescription) {
        match self.role {
            Role::Offerer => (local, remote),
            Role::Answerer => (remote, local),
        }
    }

    pub fn info(&self) -> ConnectionInfo {
        let inner = self.inner.lock();
        ConnectionInfo {
            id: self.id,
            endpoint: self.endpoint,
            role: self.role,
            state: inner.state,
            created_at: self.created_at,
            local: inner.local.clone(),
            remote: inner.remote.clone(),
            result: inner.session.as_ref().map(|s| s.result.clone()),
        }
    }
}

/// Snapshot of a connection for clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub endpoint: ObjectId,
    pub role: Role,
    pub state: ConnectionState,
    pub created_at: DateTime<Utc>,
    pub local: Option<CapabilityDescription>,
    pub remote: Option<CapabilityDescription>,
    pub result: Option<NegotiationResult>,
}
