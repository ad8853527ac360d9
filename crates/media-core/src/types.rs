//! Identifiers and value types shared across the control plane

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::MediaError;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// First eight hex digits, for names and logs
            pub fn short(&self) -> String {
                self.0.simple().to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = MediaError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| MediaError::InvalidParameter(format!("invalid {}: {}", $label, s)))
            }
        }
    };
}

uuid_id!(
    /// Identifier of a media object, generated once at creation
    ObjectId,
    "object id"
);
uuid_id!(
    /// Identifier of an event subscription
    SubscriptionId,
    "subscription id"
);
uuid_id!(
    /// Identifier of a connection on an endpoint
    ConnectionId,
    "connection id"
);

/// Type name of the root container
pub const PIPELINE_TYPE: &str = "MediaPipeline";

/// Type name of mixer ports
pub const MIXER_PORT_TYPE: &str = "MixerPort";

/// Broad category of a media object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectCategory {
    Pipeline,
    Endpoint,
    Filter,
    Mixer,
    MixerPort,
}

impl fmt::Display for ObjectCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectCategory::Pipeline => "pipeline",
            ObjectCategory::Endpoint => "endpoint",
            ObjectCategory::Filter => "filter",
            ObjectCategory::Mixer => "mixer",
            ObjectCategory::MixerPort => "mixerPort",
        };
        f.write_str(name)
    }
}

/// Concrete kind of a media object. Elements carry their registered type name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Pipeline,
    Endpoint(String),
    Filter(String),
    Mixer(String),
    MixerPort,
}

impl ObjectKind {
    pub fn category(&self) -> ObjectCategory {
        match self {
            ObjectKind::Pipeline => ObjectCategory::Pipeline,
            ObjectKind::Endpoint(_) => ObjectCategory::Endpoint,
            ObjectKind::Filter(_) => ObjectCategory::Filter,
            ObjectKind::Mixer(_) => ObjectCategory::Mixer,
            ObjectKind::MixerPort => ObjectCategory::MixerPort,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            ObjectKind::Pipeline => PIPELINE_TYPE,
            ObjectKind::Endpoint(name) | ObjectKind::Filter(name) | ObjectKind::Mixer(name) => name,
            ObjectKind::MixerPort => MIXER_PORT_TYPE,
        }
    }

    /// Endpoint, filter or mixer
    pub fn is_element(&self) -> bool {
        matches!(self, ObjectKind::Endpoint(_) | ObjectKind::Filter(_) | ObjectKind::Mixer(_))
    }

    /// Whether a mixer port may route this kind
    pub fn is_routable(&self) -> bool {
        matches!(self, ObjectKind::Endpoint(_) | ObjectKind::Filter(_))
    }

    /// Whether `self` is a legal parent for `child`
    pub fn accepts_child(&self, child: &ObjectKind) -> bool {
        match (self, child) {
            (ObjectKind::Pipeline, c) => c.is_element(),
            (ObjectKind::Mixer(_), ObjectKind::MixerPort) => true,
            _ => false,
        }
    }

    /// Built-in event types emitted by this kind
    pub fn builtin_events(&self) -> &'static [EventType] {
        match self {
            ObjectKind::Pipeline => &[EventType::Created, EventType::Destroyed, EventType::MediaError],
            ObjectKind::Endpoint(_) => &[
                EventType::Destroyed,
                EventType::Negotiated,
                EventType::EndOfStream,
                EventType::MediaError,
            ],
            ObjectKind::Filter(_) => &[EventType::Destroyed, EventType::MediaError],
            ObjectKind::Mixer(_) => &[EventType::Created, EventType::Destroyed, EventType::MediaError],
            ObjectKind::MixerPort => &[EventType::Destroyed, EventType::MediaError],
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Event type an observer can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// A child was created in this container
    Created,
    /// This object was destroyed; always the last notification for it
    Destroyed,
    /// A connection on this endpoint completed negotiation
    Negotiated,
    /// The media source reached its end
    EndOfStream,
    /// The media engine reported a fault
    MediaError,
    /// Element-specific signal declared by the element's module
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Created => "Created",
            EventType::Destroyed => "Destroyed",
            EventType::Negotiated => "Negotiated",
            EventType::EndOfStream => "EndOfStream",
            EventType::MediaError => "MediaError",
            EventType::Custom(name) => name,
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Created" => EventType::Created,
            "Destroyed" => EventType::Destroyed,
            "Negotiated" => EventType::Negotiated,
            "EndOfStream" => EventType::EndOfStream,
            "MediaError" => EventType::MediaError,
            _ => EventType::Custom(s),
        }
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        EventType::from(s.to_string())
    }
}

impl From<EventType> for String {
    fn from(event: EventType) -> Self {
        match event {
            EventType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a media object
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateParams {
    /// Inactivity allowed before collection; the configured default when unset
    #[serde(with = "optional_millis", rename = "retentionMs")]
    pub retention: Option<Duration>,
    /// Element routed by a mixer port (required for ports)
    pub routed: Option<ObjectId>,
    /// Human readable name
    pub name: Option<String>,
    /// Constructor properties passed through to the element factory
    pub properties: serde_json::Value,
}

impl CreateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    pub fn routing(mut self, element: ObjectId) -> Self {
        self.routed = Some(element);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

mod optional_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Snapshot of a media object for clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub type_name: String,
    pub category: ObjectCategory,
    pub parent: Option<ObjectId>,
    pub pipeline: ObjectId,
    pub name: String,
    pub tags: BTreeMap<String, String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub retention_ms: u64,
    pub idle_ms: u64,
    pub children: Vec<ObjectId>,
    pub routed: Option<ObjectId>,
    pub events: Vec<EventType>,
}

/// Outcome of a successful `destroy`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum DestroyOutcome {
    /// This call released the object and `count` objects in total
    Destroyed { count: usize },
    /// Another caller released (or is releasing) the object
    AlreadyReleased,
}
