//! RFC 3551 static RTP payload type assignments

/// Static payload entry: (payload type, encoding name, clock rate, channels)
type StaticEntry = (u8, &'static str, u32, Option<u8>);

const STATIC_PAYLOAD_TYPES: &[StaticEntry] = &[
    (0, "PCMU", 8000, Some(1)),
    (3, "GSM", 8000, Some(1)),
    (4, "G723", 8000, Some(1)),
    (5, "DVI4", 8000, Some(1)),
    (6, "DVI4", 16000, Some(1)),
    (7, "LPC", 8000, Some(1)),
    (8, "PCMA", 8000, Some(1)),
    (9, "G722", 8000, Some(1)),
    (10, "L16", 44100, Some(2)),
    (11, "L16", 44100, Some(1)),
    (12, "QCELP", 8000, Some(1)),
    (13, "CN", 8000, Some(1)),
    (14, "MPA", 90000, None),
    (15, "G728", 8000, Some(1)),
    (16, "DVI4", 11025, Some(1)),
    (17, "DVI4", 22050, Some(1)),
    (18, "G729", 8000, Some(1)),
    (25, "CelB", 90000, None),
    (26, "JPEG", 90000, None),
    (28, "nv", 90000, None),
    (31, "H261", 90000, None),
    (32, "MPV", 90000, None),
    (33, "MP2T", 90000, None),
    (34, "H263", 90000, None),
];

/// First payload type of the dynamic range
pub const FIRST_DYNAMIC_PAYLOAD_TYPE: u8 = 96;

/// Last payload type of the dynamic range
pub const LAST_DYNAMIC_PAYLOAD_TYPE: u8 = 127;

/// Look up a static payload type: (encoding name, clock rate, channels)
pub fn lookup(payload_type: u8) -> Option<(&'static str, u32, Option<u8>)> {
    STATIC_PAYLOAD_TYPES
        .iter()
        .find(|(pt, ..)| *pt == payload_type)
        .map(|&(_, name, rate, channels)| (name, rate, channels))
}

/// Find the static payload type for an encoding, if one is assigned.
/// For encodings listed more than once the first entry wins.
pub fn find(encoding_name: &str, clock_rate: u32) -> Option<u8> {
    STATIC_PAYLOAD_TYPES
        .iter()
        .find(|(_, name, rate, _)| *rate == clock_rate && name.eq_ignore_ascii_case(encoding_name))
        .map(|(pt, ..)| *pt)
}
