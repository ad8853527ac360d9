//! Client sessions and event push
//!
//! Each connected client gets a [`ClientSession`] whose token doubles as the
//! event [`Destination`]. The transport drains the session's outbound
//! channel; [`SessionEventSink`] fills it.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use rmedia_media_core::{DeliveryError, Destination, EventNotification, EventSink};

use crate::protocol::RpcNotification;

/// Outbound queue size used by [`SessionRegistry::open`]
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Identity of one connected client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientSession {
    pub token: String,
}

impl ClientSession {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    /// Destination under which this session's subscriptions are filed
    pub fn destination(&self) -> Destination {
        Destination::new(self.token.clone())
    }
}

/// Outbound channels of the connected clients, keyed by session token
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, mpsc::Sender<RpcNotification>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new session with a fresh token
    pub fn open(&self, capacity: usize) -> (ClientSession, mpsc::Receiver<RpcNotification>) {
        let session = ClientSession::new(Uuid::new_v4().to_string());
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.register(&session, tx);
        (session, rx)
    }

    /// Register a session under a transport-supplied token, replacing any
    /// previous channel
    pub fn register(&self, session: &ClientSession, sender: mpsc::Sender<RpcNotification>) {
        self.sessions.insert(session.token.clone(), sender);
        debug!("Client session {} registered", session.token);
    }

    /// Forget a session; returns whether it was known
    pub fn remove(&self, session: &ClientSession) -> bool {
        let removed = self.sessions.remove(&session.token).is_some();
        if removed {
            debug!("Client session {} removed", session.token);
        }
        removed
    }

    pub fn contains(&self, token: &str) -> bool {
        self.sessions.contains_key(token)
    }

    pub fn sender(&self, token: &str) -> Option<mpsc::Sender<RpcNotification>> {
        self.sessions.get(token).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// [`EventSink`] that pushes `onEvent` notifications onto session channels
#[derive(Debug, Clone)]
pub struct SessionEventSink {
    sessions: Arc<SessionRegistry>,
}

impl SessionEventSink {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl EventSink for SessionEventSink {
    async fn deliver(&self, destination: &Destination, notification: &EventNotification) -> Result<(), DeliveryError> {
        let Some(sender) = self.sessions.sender(destination.as_str()) else {
            return Err(DeliveryError::Unreachable(format!("no session {}", destination)));
        };

        match sender.try_send(RpcNotification::event(notification.clone())) {
            Ok(()) => {
                trace!("Pushed {} to {}", notification.event_type, destination);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(DeliveryError::Rejected(format!("outbound queue of {} is full", destination)))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(DeliveryError::Unreachable(format!("session {} is closed", destination)))
            }
        }
    }
}
