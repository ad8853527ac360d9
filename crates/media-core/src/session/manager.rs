use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use rmedia_sdp_core::{CapabilityDescription, NegotiatedSession};

use super::connection::{Connection, ConnectionInfo, ConnectionState, Role};
use crate::error::{MediaError, Result};
use crate::types::{ConnectionId, ObjectId};

/// Result of a `negotiate` call
#[derive(Debug, Clone)]
pub struct NegotiationOutcome {
    pub connection: ConnectionId,
    pub endpoint: ObjectId,
    pub session: Arc<NegotiatedSession>,
    /// True when the remote description matched the previous one and the
    /// stored session was returned as is
    pub cached: bool,
    /// True when a negotiation started later on the same connection; this
    /// result was computed but not stored
    pub superseded: bool,
}

/// A negotiation holding its generation number while the result is computed
#[derive(Debug)]
struct PendingNegotiation {
    connection: Arc<Connection>,
    local: CapabilityDescription,
    remote: CapabilityDescription,
    generation: u64,
}

enum Started {
    Cached(NegotiationOutcome),
    Pending(PendingNegotiation),
}

/// Store of connections keyed by id and by endpoint.
///
/// The manager does not validate endpoints; callers create connections while
/// holding the endpoint's lock and the graph drops them through
/// [`release_object`](Self::release_object) when the endpoint is destroyed.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    by_endpoint: DashMap<ObjectId, Vec<ConnectionId>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, endpoint: ObjectId, role: Role) -> ConnectionId {
        let connection = Arc::new(Connection::new(endpoint, role));
        let id = connection.id;
        self.connections.insert(id, connection);
        self.by_endpoint.entry(endpoint).or_default().push(id);
        debug!("Created {:?} connection {} on {}", role, id, endpoint);
        id
    }

    pub fn get(&self, id: ConnectionId) -> Result<Arc<Connection>> {
        self.connections
            .get(&id)
            .map(|c| c.value().clone())
            .ok_or_else(|| MediaError::NotFound(format!("connection {}", id)))
    }

    /// Set the local capability description. Only legal before the first
    /// negotiation.
    pub fn set_local_spec(&self, id: ConnectionId, spec: CapabilityDescription) -> Result<()> {
        let connection = self.get(id)?;
        let mut inner = connection.inner.lock();
        match inner.state {
            ConnectionState::Created | ConnectionState::LocalSpecSet => {
                inner.local = Some(spec);
                inner.state = ConnectionState::LocalSpecSet;
                Ok(())
            }
            state => Err(MediaError::InvalidState(format!(
                "cannot set local description on connection {} in state {}",
                id, state
            ))),
        }
    }

    /// Negotiate the local description against `remote`.
    ///
    /// An identical remote description returns the stored session. A
    /// different one computes a new session outside the lock and swaps it in
    /// whole. Of concurrent negotiations the one started last is stored; the
    /// others come back `superseded`.
    pub fn negotiate(&self, id: ConnectionId, remote: CapabilityDescription) -> Result<NegotiationOutcome> {
        match self.begin_negotiation(id, remote)? {
            Started::Cached(outcome) => Ok(outcome),
            Started::Pending(pending) => complete_negotiation(pending),
        }
    }

    fn begin_negotiation(&self, id: ConnectionId, remote: CapabilityDescription) -> Result<Started> {
        let connection = self.get(id)?;
        let mut inner = connection.inner.lock();
        if inner.state == ConnectionState::Closed {
            return Err(MediaError::InvalidState(format!("connection {} is closed", id)));
        }
        let Some(local) = inner.local.clone() else {
            return Err(MediaError::MissingLocalSpec(id.to_string()));
        };

        if inner.state == ConnectionState::Negotiated && inner.remote.as_ref() == Some(&remote) {
            if let Some(session) = inner.session.clone() {
                return Ok(Started::Cached(NegotiationOutcome {
                    connection: id,
                    endpoint: connection.endpoint,
                    session,
                    cached: true,
                    superseded: false,
                }));
            }
        }

        inner.state = ConnectionState::Negotiating;
        inner.generation += 1;
        let generation = inner.generation;
        drop(inner);

        Ok(Started::Pending(PendingNegotiation {
            connection,
            local,
            remote,
            generation,
        }))
    }

    /// Close a connection and release its session. Closing twice fails.
    pub fn close(&self, id: ConnectionId) -> Result<()> {
        let connection = self.get(id)?;
        let mut inner = connection.inner.lock();
        if inner.state == ConnectionState::Closed {
            return Err(MediaError::InvalidState(format!("connection {} is already closed", id)));
        }
        inner.state = ConnectionState::Closed;
        inner.session = None;
        debug!("Closed connection {}", id);
        Ok(())
    }

    pub fn info(&self, id: ConnectionId) -> Result<ConnectionInfo> {
        Ok(self.get(id)?.info())
    }

    /// Endpoint a connection belongs to
    pub fn endpoint_of(&self, id: ConnectionId) -> Result<ObjectId> {
        Ok(self.get(id)?.endpoint)
    }

    /// Connections of an endpoint in creation order, closed ones included
    pub fn connections_for(&self, endpoint: ObjectId) -> Vec<ConnectionId> {
        self.by_endpoint
            .get(&endpoint)
            .map(|ids| ids.clone())
            .unwrap_or_default()
    }

    /// Whether the endpoint has a connection that is not closed
    pub fn has_active(&self, endpoint: ObjectId) -> bool {
        self.connections_for(endpoint)
            .into_iter()
            .filter_map(|id| self.connections.get(&id).map(|c| c.value().clone()))
            .any(|c| !c.is_closed())
    }

    /// Close and forget every connection of a destroyed endpoint
    pub fn release_object(&self, endpoint: ObjectId) -> usize {
        let Some((_, ids)) = self.by_endpoint.remove(&endpoint) else {
            return 0;
        };

        for id in &ids {
            if let Some((_, connection)) = self.connections.remove(id) {
                let mut inner = connection.inner.lock();
                inner.state = ConnectionState::Closed;
                inner.session = None;
            }
        }
        debug!("Released {} connections of {}", ids.len(), endpoint);
        ids.len()
    }

    /// Number of known connections, closed ones included
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of connections that are not closed
    pub fn active_count(&self) -> usize {
        self.connections.iter().filter(|c| !c.is_closed()).count()
    }
}

fn complete_negotiation(pending: PendingNegotiation) -> Result<NegotiationOutcome> {
    let PendingNegotiation {
        connection,
        local,
        remote,
        generation,
    } = pending;
    let id = connection.id;

    let (offer, answer) = connection.order(&local, &remote);
    let session = Arc::new(NegotiatedSession::new(offer.clone(), answer.clone()));

    let mut inner = connection.inner.lock();
    if inner.state == ConnectionState::Closed {
        return Err(MediaError::InvalidState(format!(
            "connection {} closed during negotiation",
            id
        )));
    }

    let superseded = inner.generation != generation;
    if superseded {
        debug!(
            "Connection {}: negotiation {} superseded by {}",
            id, generation, inner.generation
        );
    } else {
        inner.remote = Some(remote);
        inner.session = Some(session.clone());
        inner.state = ConnectionState::Negotiated;
        debug!(
            "Connection {} negotiated (generation {}, {} of {} lines accepted)",
            id,
            generation,
            session.result.accepted_count(),
            session.result.media.len()
        );
    }

    Ok(NegotiationOutcome {
        connection: id,
        endpoint: connection.endpoint,
        session,
        cached: false,
        superseded,
    })
}
