//! Offer/answer capability negotiation
//!
//! [`negotiate`] is a pure function: it pairs media lines by position,
//! intersects directions through the send/receive lattice and intersects
//! payloads by encoding name and clock rate. The output order is fully
//! determined by the inputs so results can be compared byte for byte.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::types::{CapabilityDescription, Direction, MediaDescriptor, MediaKind, PayloadDescriptor};

/// Negotiated outcome for one media line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NegotiatedMedia {
    /// Media kind of the offer line
    pub kind: MediaKind,
    /// Resulting direction, from the offerer's perspective
    pub direction: Direction,
    /// Usable payloads, most preferred first; empty when rejected
    pub payloads: Vec<PayloadDescriptor>,
    /// True when no media can flow on this line
    pub rejected: bool,
}

impl NegotiatedMedia {
    fn rejected(kind: MediaKind) -> Self {
        Self {
            kind,
            direction: Direction::Inactive,
            payloads: Vec::new(),
            rejected: true,
        }
    }
}

/// Result of negotiating an offer against an answer; one entry per offer line
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NegotiationResult {
    pub media: Vec<NegotiatedMedia>,
}

impl NegotiationResult {
    /// True when no line carries media. This is the "negotiation empty"
    /// outcome; it is data, not an error.
    pub fn is_empty(&self) -> bool {
        self.media.iter().all(|m| m.rejected)
    }

    /// Number of lines that carry media
    pub fn accepted_count(&self) -> usize {
        self.media.iter().filter(|m| !m.rejected).count()
    }

    /// The result as the offerer would describe it
    pub fn offerer_view(&self) -> CapabilityDescription {
        self.view(|d| d)
    }

    /// The result as the answerer would describe it (directions reversed)
    pub fn answerer_view(&self) -> CapabilityDescription {
        self.view(|d| d.reversed())
    }

    fn view(&self, direction: impl Fn(Direction) -> Direction) -> CapabilityDescription {
        CapabilityDescription::new(
            self.media
                .iter()
                .map(|m| MediaDescriptor::new(m.kind, direction(m.direction), m.payloads.clone()))
                .collect(),
        )
    }
}

/// An offer, an answer and their intersection. Never mutated; renegotiation
/// produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiatedSession {
    pub offerer: CapabilityDescription,
    pub answerer: CapabilityDescription,
    pub result: NegotiationResult,
}

impl NegotiatedSession {
    /// Negotiate `offerer` against `answerer` and keep all three
    pub fn new(offerer: CapabilityDescription, answerer: CapabilityDescription) -> Self {
        let result = negotiate(&offerer, &answerer);
        Self {
            offerer,
            answerer,
            result,
        }
    }
}

/// Compute the usable subset of `offer` and `answer`.
///
/// The result always has exactly `offer.media.len()` lines.
pub fn negotiate(offer: &CapabilityDescription, answer: &CapabilityDescription) -> NegotiationResult {
    let media = offer
        .media
        .iter()
        .enumerate()
        .map(|(i, offered)| match answer.media.get(i) {
            Some(answered) => negotiate_line(offered, answered),
            None => NegotiatedMedia::rejected(offered.kind),
        })
        .collect();

    NegotiationResult { media }
}

/// Offerer's effective direction given both declared directions.
///
/// The answerer's direction is written from its own side, so the offerer
/// can send only if the answerer receives and vice versa.
pub fn intersect_direction(offer: Direction, answer: Direction) -> Direction {
    Direction::from_flags(
        offer.sends() && answer.receives(),
        offer.receives() && answer.sends(),
    )
}

fn negotiate_line(offered: &MediaDescriptor, answered: &MediaDescriptor) -> NegotiatedMedia {
    if offered.kind != answered.kind {
        return NegotiatedMedia::rejected(offered.kind);
    }

    let direction = intersect_direction(offered.direction, answered.direction);
    if direction == Direction::Inactive {
        return NegotiatedMedia::rejected(offered.kind);
    }

    let payloads = intersect_payloads(&offered.payloads, &answered.payloads);
    if payloads.is_empty() {
        return NegotiatedMedia::rejected(offered.kind);
    }

    NegotiatedMedia {
        kind: offered.kind,
        direction,
        payloads,
        rejected: false,
    }
}

/// Matching payloads ordered by offerer rank, then answerer rank, then
/// encoding name. The offerer's descriptor is kept for each match.
fn intersect_payloads(offered: &[PayloadDescriptor], answered: &[PayloadDescriptor]) -> Vec<PayloadDescriptor> {
    let mut matches: Vec<(&PayloadDescriptor, u32)> = offered
        .iter()
        .filter_map(|o| {
            answered
                .iter()
                .filter(|a| o.matches(a))
                .map(|a| a.rank)
                .min()
                .map(|answer_rank| (o, answer_rank))
        })
        .collect();

    // Stable sort: entries that compare equal keep offer order
    matches.sort_by(|(a, a_rank), (b, b_rank)| {
        a.rank
            .cmp(&b.rank)
            .then_with(|| a_rank.cmp(b_rank))
            .then_with(|| compare_names(&a.encoding_name, &b.encoding_name))
    });

    matches.into_iter().map(|(p, _)| p.clone()).collect()
}

fn compare_names(a: &str, b: &str) -> Ordering {
    a.to_ascii_lowercase()
        .cmp(&b.to_ascii_lowercase())
        .then_with(|| a.cmp(b))
}
