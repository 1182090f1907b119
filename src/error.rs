use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error type shared by the geometry codec, the response extractors and the
/// mutation client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed input: {0}")]
    MalformedInput(#[from] MalformedInput),

    #[error("missing required node: {0}")]
    MissingRequiredNode(MissingNode),

    #[error("mutation #{index} rejected before submit: {reason}")]
    ValidationFailed { index: usize, reason: String },

    #[error("transport failure calling {endpoint} (status {}): {body}", status_label(.status))]
    TransportFailure {
        endpoint: String,
        status: Option<u16>,
        body: String,
    },

    #[error("request to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("coordinate transform failed: {0}")]
    Projection(String),

    #[error("XML parse error at byte {position}: {message}")]
    XmlParse { position: u64, message: String },

    #[error("SOAP fault {code}: {message}")]
    SoapFault { code: String, message: String },

    #[error("credential unavailable: {0}")]
    Credential(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Only timeouts are worth repeating verbatim; every other failure needs
    /// a changed request or operator attention.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    #[must_use]
    pub fn missing(node: MissingNode) -> Self {
        Self::MissingRequiredNode(node)
    }

    #[must_use]
    pub fn validation(index: usize, reason: impl Into<String>) -> Self {
        Self::ValidationFailed {
            index,
            reason: reason.into(),
        }
    }

    /// Returns the missing node identity, if this is a `MissingRequiredNode`.
    #[must_use]
    pub fn missing_node(&self) -> Option<MissingNode> {
        match self {
            Self::MissingRequiredNode(node) => Some(*node),
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse {
            position: 0,
            message: err.to_string(),
        }
    }
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

/// Input that cannot be turned into a request or a geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedInput {
    #[error("unsupported geometry type `{0}`")]
    UnsupportedGeometry(String),

    #[error("invalid GeoJSON: {0}")]
    InvalidGeoJson(String),

    #[error("coordinate {0} is not a finite number pair")]
    InvalidCoordinate(String),

    #[error("node `{node}` holds non-numeric value `{value}`")]
    InvalidNumber { node: &'static str, value: String },
}

/// The response node an extractor expected but did not find.
///
/// Each extractor target has its own identity so callers can tell a malformed
/// response (missing ticket id) apart from one that is merely not ready or
/// legitimately empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissingNode {
    Envelope,
    Body,
    SubmitResponse,
    TicketId,
    ProgressResponse,
    ProcessStatus,
    StatusCode,
    Percentage,
    ValidationResponse,
    TanSequenceResponse,
    SequenceNumber,
    FormalizeResponse,
    CancelResponse,
    ResultCode,
    CropFieldResponse,
}

impl MissingNode {
    /// Element name (without namespace prefix) the extractor looked for.
    #[must_use]
    pub fn node_name(self) -> &'static str {
        match self {
            Self::Envelope => "Envelope",
            Self::Body => "Body",
            Self::SubmitResponse => "CropFieldMutationResponse",
            Self::TicketId => "TicketId",
            Self::ProgressResponse => "ProcessProgressResponse",
            Self::ProcessStatus => "ProcessStatus",
            Self::StatusCode => "StatusCode",
            Self::Percentage => "Percentage",
            Self::ValidationResponse => "ValidationResultResponse",
            Self::TanSequenceResponse => "TanSequenceResponse",
            Self::SequenceNumber => "SequenceNumber",
            Self::FormalizeResponse => "FormalizeResponse",
            Self::CancelResponse => "CancelResponse",
            Self::ResultCode => "ResultCode",
            Self::CropFieldResponse => "CropFieldDetailsResponse",
        }
    }
}

impl fmt::Display for MissingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.node_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_node_identities_are_distinct() {
        let status = Error::missing(MissingNode::ProcessStatus);
        let ticket = Error::missing(MissingNode::TicketId);

        assert_eq!(status.missing_node(), Some(MissingNode::ProcessStatus));
        assert_eq!(ticket.missing_node(), Some(MissingNode::TicketId));
        assert_ne!(status.missing_node(), ticket.missing_node());
        assert_eq!(
            status.to_string(),
            "missing required node: ProcessStatus"
        );
    }

    #[test]
    fn test_only_timeout_is_retryable() {
        let timeout = Error::Timeout {
            endpoint: "https://example.invalid".to_string(),
            after: Duration::from_secs(5),
        };
        let failure = Error::TransportFailure {
            endpoint: "https://example.invalid".to_string(),
            status: Some(500),
            body: "<Fault/>".to_string(),
        };

        assert!(timeout.is_retryable());
        assert!(!failure.is_retryable());
        assert!(failure.to_string().contains("status 500"));
        assert!(failure.to_string().contains("<Fault/>"));
    }
}
