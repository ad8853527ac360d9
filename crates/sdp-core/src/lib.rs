//! # rmedia sdp-core
//!
//! Capability descriptions and the offer/answer negotiation engine used by
//! the media server control plane.
//!
//! - [`types`]: capability descriptions (media lines, payloads, directions)
//! - [`negotiation`]: the pure intersection function and its result types
//! - [`parser`] / [`render`]: a minimal SDP text codec for those descriptions
//!
//! ```
//! use rmedia_sdp_core::prelude::*;
//!
//! let offer = CapabilityDescription::new(vec![MediaDescriptor::audio(vec![
//!     PayloadDescriptor::new("opus", 48000).with_rank(0),
//!     PayloadDescriptor::new("PCMU", 8000).with_rank(1),
//! ])]);
//! let answer = CapabilityDescription::new(vec![MediaDescriptor::audio(vec![
//!     PayloadDescriptor::new("pcmu", 8000),
//! ])]);
//!
//! let result = negotiate(&offer, &answer);
//! assert_eq!(result.media[0].payloads[0].encoding_name, "PCMU");
//! ```

pub mod error;
pub mod negotiation;
pub mod parser;
pub mod render;
pub mod static_types;
pub mod types;

pub use error::{Result, SdpError};
pub use negotiation::{negotiate, NegotiatedMedia, NegotiatedSession, NegotiationResult};
pub use parser::parse_sdp;
pub use render::{render_sdp, render_sdp_with, RenderOptions};
pub use types::{CapabilityDescription, Direction, MediaDescriptor, MediaKind, PayloadDescriptor};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::{
        negotiate, parse_sdp, render_sdp, CapabilityDescription, Direction, MediaDescriptor, MediaKind,
        NegotiatedMedia, NegotiatedSession, NegotiationResult, PayloadDescriptor, SdpError,
    };
}
