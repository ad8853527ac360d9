use thiserror::Error;

use rmedia_media_core::MediaError;
use rmedia_sdp_core::SdpError;

use crate::protocol::{error_codes, ErrorObject};

/// Result type for request handling
pub type Result<T> = std::result::Result<T, RpcError>;

/// Errors returned to clients
#[derive(Debug, Error)]
pub enum RpcError {
    /// Failure reported by the control plane
    #[error(transparent)]
    Media(#[from] MediaError),

    /// SDP text could not be parsed
    #[error("Invalid SDP: {0}")]
    Sdp(#[from] SdpError),

    /// Unknown operation name
    #[error("Unknown operation: {0}")]
    MethodNotFound(String),

    /// Missing or malformed parameters
    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl RpcError {
    /// Stable code reported to clients
    pub fn code(&self) -> i32 {
        match self {
            RpcError::Media(e) => match e {
                MediaError::NotFound(_) => error_codes::NOT_FOUND,
                MediaError::InvalidParent(_) => error_codes::INVALID_PARENT,
                MediaError::InvalidState(_) => error_codes::INVALID_STATE,
                MediaError::MissingLocalSpec(_) => error_codes::MISSING_LOCAL_SPEC,
                MediaError::UnsupportedEvent { .. } => error_codes::UNSUPPORTED_EVENT,
                MediaError::ResourceExhausted(_) => error_codes::RESOURCE_EXHAUSTED,
                MediaError::UnsupportedKind(_) => error_codes::UNSUPPORTED_KIND,
                MediaError::InvalidParameter(_) => error_codes::INVALID_PARAMS,
                MediaError::Infra(_) => error_codes::INTERNAL_ERROR,
            },
            RpcError::Sdp(_) | RpcError::InvalidParams(_) => error_codes::INVALID_PARAMS,
            RpcError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
        }
    }

    /// Short machine-readable name
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Media(e) => match e {
                MediaError::NotFound(_) => "NotFound",
                MediaError::InvalidParent(_) => "InvalidParent",
                MediaError::InvalidState(_) => "InvalidState",
                MediaError::MissingLocalSpec(_) => "MissingLocalSpec",
                MediaError::UnsupportedEvent { .. } => "UnsupportedEvent",
                MediaError::ResourceExhausted(_) => "ResourceExhausted",
                MediaError::UnsupportedKind(_) => "UnsupportedKind",
                MediaError::InvalidParameter(_) => "InvalidParameter",
                MediaError::Infra(_) => "Internal",
            },
            RpcError::Sdp(_) => "InvalidSdp",
            RpcError::MethodNotFound(_) => "MethodNotFound",
            RpcError::InvalidParams(_) => "InvalidParams",
        }
    }

    pub fn to_error_object(&self) -> ErrorObject {
        ErrorObject {
            code: self.code(),
            message: self.to_string(),
            data: Some(serde_json::json!({ "type": self.kind() })),
        }
    }
}
