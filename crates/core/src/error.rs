use crate::fetch::FetchError;
use crate::gate::LegalNotice;
use pod_types::WebId;

/// Errors raised by resource, governance and record operations.
///
/// A missing resource (404) is never an error: reads return `Ok(None)` instead.
#[derive(Debug, thiserror::Error)]
pub enum PodError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("transport failure: {0}")]
    Transport(#[from] FetchError),
    #[error("access to {url} is forbidden")]
    Forbidden { url: String },
    #[error("request to {url} failed with status {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to serialize resource: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize {url}: {source}")]
    Deserialization {
        url: String,
        #[source]
        source: serde_path_to_error::Error<serde_json::Error>,
    },
    #[error("access-control document error: {0}")]
    Acp(#[from] acp::AcpError),
    #[error("{web_id} is not permitted to {action}")]
    NotPermitted {
        web_id: WebId,
        action: &'static str,
    },
    #[error("identity has no configured role: {0}")]
    UnknownIdentity(WebId),
    #[error("terms document missing at {url}")]
    MissingTerms { url: String },
    #[error("file not found: {0}")]
    FileNotFound(uuid::Uuid),
}

pub type PodResult<T> = std::result::Result<T, PodError>;

/// Reasons a doctor read is refused.
///
/// `NoActiveGrant` is terminal until the patient grants again; `LegalNoticeRequired` is
/// recoverable by acknowledging the carried notice.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("no active grant for this patient and scope")]
    NoActiveGrant,
    #[error("terms {} must be acknowledged before reading", .0.terms_version)]
    LegalNoticeRequired(Box<LegalNotice>),
    #[error(transparent)]
    Pod(#[from] PodError),
}

pub type GateResult<T> = std::result::Result<T, GateError>;
