//! SDP text parsing
//!
//! Only the parts of SDP that feed a [`CapabilityDescription`] are
//! interpreted: `m=` lines, `a=rtpmap`, `a=fmtp` and the direction
//! attributes. Everything else is checked for the `<type>=<value>` shape and
//! then ignored.

use std::collections::{BTreeMap, HashMap};

use nom::{
    bytes::complete::{tag, take_till1, take_while1},
    character::complete::{alpha1, anychar, char, digit1, not_line_ending, space0, space1},
    combinator::{all_consuming, map_res, opt},
    multi::many0,
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::{Result, SdpError};
use crate::static_types;
use crate::types::{CapabilityDescription, Direction, MediaDescriptor, MediaKind, PayloadDescriptor};

/// Parse an SDP line into its type character and trimmed value
pub fn parse_sdp_line(input: &str) -> IResult<&str, (char, &str)> {
    let (input, key) = anychar(input)?;
    let (input, _) = char('=')(input)?;
    let (input, value) = not_line_ending(input)?;
    let input = input.trim_start_matches(['\r', '\n']);

    Ok((input, (key, value.trim())))
}

/// Fields of an `m=` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaLine<'a> {
    pub media: &'a str,
    pub port: u16,
    pub protocol: &'a str,
    pub formats: Vec<u8>,
}

fn parse_u8(input: &str) -> IResult<&str, u8> {
    map_res(digit1, str::parse::<u8>)(input)
}

fn parse_u16(input: &str) -> IResult<&str, u16> {
    map_res(digit1, str::parse::<u16>)(input)
}

fn parse_u32(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}

/// Parse the value of an `m=` line: `<media> <port>[/<count>] <proto> <fmt> ...`
pub fn parse_media_line(input: &str) -> IResult<&str, MediaLine<'_>> {
    let (input, media) = alpha1(input)?;
    let (input, _) = space1(input)?;
    let (input, port) = parse_u16(input)?;
    let (input, _) = opt(preceded(char('/'), digit1))(input)?;
    let (input, _) = space1(input)?;
    let (input, protocol) = take_till1(|c: char| c.is_whitespace())(input)?;
    let (input, formats) = many0(preceded(space1, parse_u8))(input)?;
    let (input, _) = space0(input)?;

    Ok((
        input,
        MediaLine {
            media,
            port,
            protocol,
            formats,
        },
    ))
}

/// Fields of an `a=rtpmap` value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap<'a> {
    pub payload_type: u8,
    pub encoding_name: &'a str,
    pub clock_rate: u32,
    pub channels: Option<u8>,
}

/// Parse an `rtpmap` attribute value: `<pt> <name>/<rate>[/<channels>]`
pub fn parse_rtpmap(input: &str) -> IResult<&str, RtpMap<'_>> {
    let (input, (payload_type, _, encoding_name, _, clock_rate, channels)) = tuple((
        parse_u8,
        space1,
        take_till1(|c: char| c == '/' || c.is_whitespace()),
        char('/'),
        parse_u32,
        opt(preceded(char('/'), parse_u8)),
    ))(input)?;

    Ok((
        input,
        RtpMap {
            payload_type,
            encoding_name,
            clock_rate,
            channels,
        },
    ))
}

/// Parse an `fmtp` attribute value: `<pt> <k>=<v>;<k>=<v>...`.
/// A parameter without `=` is kept with an empty value.
pub fn parse_fmtp(input: &str) -> IResult<&str, (u8, BTreeMap<String, String>)> {
    let (input, payload_type) = parse_u8(input)?;
    let (input, _) = space1(input)?;
    let (rest, params) = take_while1(|_: char| true)(input)?;

    let parameters = params
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
            None => (p.to_string(), String::new()),
        })
        .collect();

    Ok((rest, (payload_type, parameters)))
}

/// Media section collected while scanning lines
#[derive(Debug)]
struct MediaSection {
    kind: MediaKind,
    rejected: bool,
    formats: Vec<u8>,
    direction: Option<Direction>,
    rtpmaps: HashMap<u8, (String, u32, Option<u8>)>,
    fmtps: HashMap<u8, BTreeMap<String, String>>,
}

impl MediaSection {
    /// Line kept only to hold its position; its formats are not RTP payloads
    fn placeholder(kind: MediaKind) -> Self {
        Self {
            kind,
            rejected: true,
            formats: Vec::new(),
            direction: None,
            rtpmaps: HashMap::new(),
            fmtps: HashMap::new(),
        }
    }

    fn into_descriptor(self, session_direction: Direction) -> Result<MediaDescriptor> {
        if self.rejected {
            return Ok(MediaDescriptor::new(self.kind, Direction::Inactive, Vec::new()));
        }

        let mut payloads = Vec::with_capacity(self.formats.len());
        for (rank, pt) in self.formats.iter().enumerate() {
            let (name, rate, channels) = match self.rtpmaps.get(pt) {
                Some((name, rate, channels)) => (name.clone(), *rate, *channels),
                None => match static_types::lookup(*pt) {
                    Some((name, rate, channels)) => (name.to_string(), rate, channels),
                    None => return Err(SdpError::MissingRtpmap(*pt)),
                },
            };

            let mut payload = PayloadDescriptor::new(name, rate)
                .with_rank(rank as u32)
                .with_payload_type(*pt);
            payload.channels = channels;
            if let Some(params) = self.fmtps.get(pt) {
                payload.parameters = params.clone();
            }
            payloads.push(payload);
        }

        Ok(MediaDescriptor::new(
            self.kind,
            self.direction.unwrap_or(session_direction),
            payloads,
        ))
    }
}

fn direction_attribute(value: &str) -> Option<Direction> {
    value.parse().ok()
}

/// Parse an SDP body into a capability description.
///
/// A session-level direction attribute is the default for every media line.
/// Payload rank is the position of the format in the `m=` line. An `m=` line
/// with port 0 is read as a rejected (inactive, empty) line.
pub fn parse_sdp(input: &str) -> Result<CapabilityDescription> {
    let mut saw_version = false;
    let mut session_direction = Direction::SendRecv;
    let mut sections: Vec<MediaSection> = Vec::new();

    for (index, raw) in input.lines().enumerate() {
        let line_number = index + 1;
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (_, (key, value)) = parse_sdp_line(raw).map_err(|_| SdpError::MalformedLine {
            line: line_number,
            content: raw.to_string(),
        })?;

        match key {
            'v' => saw_version = true,
            'm' => {
                let kind: MediaKind = value
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .parse()
                    .map_err(SdpError::UnsupportedMedia)?;
                if kind == MediaKind::Application {
                    sections.push(MediaSection::placeholder(kind));
                    continue;
                }
                let (_, media) = all_consuming(parse_media_line)(value)
                    .map_err(|_| SdpError::InvalidMediaLine(value.to_string()))?;
                sections.push(MediaSection {
                    kind,
                    rejected: media.port == 0,
                    formats: media.formats,
                    direction: None,
                    rtpmaps: HashMap::new(),
                    fmtps: HashMap::new(),
                });
            }
            'a' => parse_attribute(value, sections.last_mut(), &mut session_direction)?,
            c if c.is_ascii_lowercase() => {}
            _ => {
                return Err(SdpError::MalformedLine {
                    line: line_number,
                    content: raw.to_string(),
                })
            }
        }
    }

    if !saw_version {
        return Err(SdpError::MissingVersion);
    }

    let media = sections
        .into_iter()
        .map(|s| s.into_descriptor(session_direction))
        .collect::<Result<Vec<_>>>()?;

    Ok(CapabilityDescription::new(media))
}

fn parse_attribute(value: &str, section: Option<&mut MediaSection>, session_direction: &mut Direction) -> Result<()> {
    if let Some(direction) = direction_attribute(value) {
        match section {
            Some(section) => section.direction = Some(direction),
            None => *session_direction = direction,
        }
        return Ok(());
    }

    if let Ok((_, rest)) = tag::<_, _, nom::error::Error<&str>>("rtpmap:")(value) {
        let section = section.ok_or_else(|| SdpError::UnexpectedAttribute(value.to_string()))?;
        if section.rejected {
            return Ok(());
        }
        let (_, map) = all_consuming(parse_rtpmap)(rest.trim())
            .map_err(|_| SdpError::InvalidAttribute(value.to_string()))?;
        section.rtpmaps.insert(
            map.payload_type,
            (map.encoding_name.to_string(), map.clock_rate, map.channels),
        );
        return Ok(());
    }

    if let Ok((_, rest)) = tag::<_, _, nom::error::Error<&str>>("fmtp:")(value) {
        let section = section.ok_or_else(|| SdpError::UnexpectedAttribute(value.to_string()))?;
        if section.rejected {
            return Ok(());
        }
        let (_, (pt, params)) = parse_fmtp(rest.trim()).map_err(|_| SdpError::InvalidAttribute(value.to_string()))?;
        section.fmtps.insert(pt, params);
        return Ok(());
    }

    Ok(())
}
