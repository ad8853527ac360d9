//! Capability description types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Media kind of a media line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Audio media line
    Audio,
    /// Video media line
    Video,
    /// Non-RTP application data (e.g. a WebRTC data channel); never negotiated
    Application,
}

impl MediaKind {
    /// SDP token for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Application => "application",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(MediaKind::Audio),
            "video" => Ok(MediaKind::Video),
            "application" => Ok(MediaKind::Application),
            other => Err(other.to_string()),
        }
    }
}

/// Media direction, always expressed from the perspective of the party that
/// wrote the description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Send and receive
    #[default]
    SendRecv,
    /// Send only
    SendOnly,
    /// Receive only
    RecvOnly,
    /// No media flow
    Inactive,
}

impl Direction {
    /// Build a direction from send/receive flags
    pub fn from_flags(sends: bool, receives: bool) -> Self {
        match (sends, receives) {
            (true, true) => Direction::SendRecv,
            (true, false) => Direction::SendOnly,
            (false, true) => Direction::RecvOnly,
            (false, false) => Direction::Inactive,
        }
    }

    /// Whether this party sends media
    pub fn sends(&self) -> bool {
        matches!(self, Direction::SendRecv | Direction::SendOnly)
    }

    /// Whether this party receives media
    pub fn receives(&self) -> bool {
        matches!(self, Direction::SendRecv | Direction::RecvOnly)
    }

    /// The same flow seen from the other party
    pub fn reversed(&self) -> Self {
        Direction::from_flags(self.receives(), self.sends())
    }

    /// SDP attribute name for this direction
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendRecv => "sendrecv",
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::Inactive => "inactive",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sendrecv" => Ok(Direction::SendRecv),
            "sendonly" => Ok(Direction::SendOnly),
            "recvonly" => Ok(Direction::RecvOnly),
            "inactive" => Ok(Direction::Inactive),
            other => Err(other.to_string()),
        }
    }
}

/// One payload format a party can handle on a media line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PayloadDescriptor {
    /// Encoding name, e.g. `opus`, `PCMU`, `VP8` (matched case-insensitively)
    pub encoding_name: String,
    /// Clock rate in Hz
    pub clock_rate: u32,
    /// Encoding-specific parameters (`a=fmtp`)
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Priority rank; lower is more preferred
    #[serde(default)]
    pub rank: u32,
    /// RTP payload type number, carried through but never matched on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<u8>,
    /// Channel count for audio, carried through but never matched on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
}

impl PayloadDescriptor {
    /// Create a payload with rank 0 and no parameters
    pub fn new(encoding_name: impl Into<String>, clock_rate: u32) -> Self {
        Self {
            encoding_name: encoding_name.into(),
            clock_rate,
            parameters: BTreeMap::new(),
            rank: 0,
            payload_type: None,
            channels: None,
        }
    }

    /// Set the priority rank
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = rank;
        self
    }

    /// Add an encoding parameter
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Set the RTP payload type number
    pub fn with_payload_type(mut self, payload_type: u8) -> Self {
        self.payload_type = Some(payload_type);
        self
    }

    /// Set the channel count
    pub fn with_channels(mut self, channels: u8) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Two payloads are compatible when the encoding name (ignoring case)
    /// and the clock rate are equal
    pub fn matches(&self, other: &PayloadDescriptor) -> bool {
        self.clock_rate == other.clock_rate && self.encoding_name.eq_ignore_ascii_case(&other.encoding_name)
    }
}

/// One media line of a capability description
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaDescriptor {
    /// Audio, video or application
    pub kind: MediaKind,
    /// Direction from the describing party's perspective
    #[serde(default)]
    pub direction: Direction,
    /// Supported payloads, in the order the party listed them
    #[serde(default)]
    pub payloads: Vec<PayloadDescriptor>,
}

impl MediaDescriptor {
    /// Create a media line
    pub fn new(kind: MediaKind, direction: Direction, payloads: Vec<PayloadDescriptor>) -> Self {
        Self {
            kind,
            direction,
            payloads,
        }
    }

    /// A `sendrecv` audio line
    pub fn audio(payloads: Vec<PayloadDescriptor>) -> Self {
        Self::new(MediaKind::Audio, Direction::SendRecv, payloads)
    }

    /// A `sendrecv` video line
    pub fn video(payloads: Vec<PayloadDescriptor>) -> Self {
        Self::new(MediaKind::Video, Direction::SendRecv, payloads)
    }

    /// Replace the direction
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// Ordered set of media lines describing what a party can send and receive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct CapabilityDescription {
    /// Media lines in order; negotiation pairs them by position
    pub media: Vec<MediaDescriptor>,
}

impl CapabilityDescription {
    /// Create a description from media lines
    pub fn new(media: Vec<MediaDescriptor>) -> Self {
        Self { media }
    }

    /// Number of media lines
    pub fn len(&self) -> usize {
        self.media.len()
    }

    /// Whether the description has no media lines
    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }
}
