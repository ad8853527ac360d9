use thiserror::Error;

/// Result type for SDP codec operations
pub type Result<T> = std::result::Result<T, SdpError>;

/// Errors raised while reading or writing SDP text.
///
/// Negotiation itself never fails: an empty intersection is a valid result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdpError {
    /// A line is not of the form `<type>=<value>`
    #[error("Malformed SDP line {line}: {content}")]
    MalformedLine { line: usize, content: String },

    /// An `m=` line could not be parsed
    #[error("Invalid media line: {0}")]
    InvalidMediaLine(String),

    /// Media kind other than audio, video or application
    #[error("Unsupported media kind: {0}")]
    UnsupportedMedia(String),

    /// An `a=rtpmap` or `a=fmtp` attribute could not be parsed
    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    /// A dynamic payload type is listed without an `a=rtpmap`
    #[error("Payload type {0} has no rtpmap and is not a static type")]
    MissingRtpmap(u8),

    /// Attribute appears before any session or media context it could belong to
    #[error("Unexpected attribute outside media section: {0}")]
    UnexpectedAttribute(String),

    /// Document contains no `v=` line
    #[error("Missing protocol version line")]
    MissingVersion,
}
