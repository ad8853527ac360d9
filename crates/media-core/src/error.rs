use thiserror::Error;

/// Result type for control plane operations
pub type Result<T> = std::result::Result<T, MediaError>;

/// Error types for control plane operations.
///
/// An empty negotiation is not an error: it is reported through
/// `NegotiationResult::is_empty`.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Object or connection does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Parent missing or not a legal container for the requested kind
    #[error("Invalid parent: {0}")]
    InvalidParent(String),

    /// Operation not legal in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Negotiation attempted before a local capability description was set
    #[error("Connection {0} has no local capability description")]
    MissingLocalSpec(String),

    /// Event type not emitted by the object's kind
    #[error("Event {event} is not emitted by {type_name}")]
    UnsupportedEvent { type_name: String, event: String },

    /// Object cap reached or the media engine could not allocate
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Element type not registered
    #[error("Unsupported object kind: {0}")]
    UnsupportedKind(String),

    /// Malformed request parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Infrastructure failure (tasks, configuration)
    #[error("Infrastructure error: {0}")]
    Infra(#[from] rmedia_infra_common::Error),
}

/// Failure reported by a media engine factory
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Engine error: {0}")]
pub struct EngineError(pub String);

/// Failure reported by an event sink. Never surfaced to publishers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The destination's client session is gone
    #[error("Destination unreachable: {0}")]
    Unreachable(String),

    /// The transport refused the notification
    #[error("Delivery rejected: {0}")]
    Rejected(String),
}
