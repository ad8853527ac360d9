//! SDP text rendering

use std::collections::HashSet;
use std::fmt::Write;

use crate::static_types::{self, FIRST_DYNAMIC_PAYLOAD_TYPE, LAST_DYNAMIC_PAYLOAD_TYPE};
use crate::types::{CapabilityDescription, Direction, MediaDescriptor, PayloadDescriptor};

/// Options for the session-level lines of a rendered body
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub session_name: String,
    pub origin_address: String,
    pub connection_address: String,
    /// Port announced on accepted media lines
    pub port: u16,
    pub protocol: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            session_name: "rmedia".to_string(),
            origin_address: "0.0.0.0".to_string(),
            connection_address: "0.0.0.0".to_string(),
            port: 9,
            protocol: "RTP/AVP".to_string(),
        }
    }
}

/// Render a description with default session lines
pub fn render_sdp(description: &CapabilityDescription) -> String {
    render_sdp_with(description, &RenderOptions::default())
}

/// Render a description as an SDP body with CRLF line endings.
///
/// Payloads keep their payload type when it is set and unique within the
/// line; otherwise static encodings get their RFC 3551 number and everything
/// else a free number from the dynamic range. A line without payloads is
/// written as rejected (port 0, `a=inactive`).
pub fn render_sdp_with(description: &CapabilityDescription, options: &RenderOptions) -> String {
    let mut out = String::new();
    let _ = write!(out, "v=0\r\n");
    let _ = write!(out, "o=- 0 0 IN IP4 {}\r\n", options.origin_address);
    let _ = write!(out, "s={}\r\n", options.session_name);
    let _ = write!(out, "t=0 0\r\n");

    for media in &description.media {
        render_media(&mut out, media, options);
    }

    out
}

fn render_media(out: &mut String, media: &MediaDescriptor, options: &RenderOptions) {
    if media.payloads.is_empty() {
        let _ = write!(out, "m={} 0 {} 0\r\n", media.kind, options.protocol);
        let _ = write!(out, "a={}\r\n", Direction::Inactive);
        return;
    }

    let numbers = assign_payload_types(&media.payloads);
    let formats: Vec<String> = numbers.iter().map(u8::to_string).collect();

    let _ = write!(
        out,
        "m={} {} {} {}\r\n",
        media.kind,
        options.port,
        options.protocol,
        formats.join(" ")
    );
    let _ = write!(out, "c=IN IP4 {}\r\n", options.connection_address);

    for (payload, pt) in media.payloads.iter().zip(numbers) {
        let _ = write!(out, "a=rtpmap:{} {}/{}", pt, payload.encoding_name, payload.clock_rate);
        if let Some(channels) = payload.channels.filter(|c| *c > 1) {
            let _ = write!(out, "/{}", channels);
        }
        out.push_str("\r\n");

        if !payload.parameters.is_empty() {
            let params: Vec<String> = payload
                .parameters
                .iter()
                .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{}={}", k, v) })
                .collect();
            let _ = write!(out, "a=fmtp:{} {}\r\n", pt, params.join(";"));
        }
    }

    let _ = write!(out, "a={}\r\n", media.direction);
}

fn assign_payload_types(payloads: &[PayloadDescriptor]) -> Vec<u8> {
    let mut used: HashSet<u8> = HashSet::new();
    let mut slots: Vec<Option<u8>> = payloads
        .iter()
        .map(|p| {
            let pt = p
                .payload_type
                .or_else(|| static_types::find(&p.encoding_name, p.clock_rate))
                .filter(|pt| !used.contains(pt));
            if let Some(pt) = pt {
                used.insert(pt);
            }
            pt
        })
        .collect();

    let mut next = FIRST_DYNAMIC_PAYLOAD_TYPE;
    for slot in slots.iter_mut().filter(|s| s.is_none()) {
        while used.contains(&next) && next < LAST_DYNAMIC_PAYLOAD_TYPE {
            next += 1;
        }
        used.insert(next);
        *slot = Some(next);
    }

    slots.into_iter().map(|s| s.unwrap_or(FIRST_DYNAMIC_PAYLOAD_TYPE)).collect()
}
