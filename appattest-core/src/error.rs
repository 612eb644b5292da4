use thiserror::Error;

/// Failure type returned by plugins and verification services.
///
/// Collaborators are implemented by the adopter, so the core accepts any
/// error and only ever uses it for logging.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Closed set of outcomes a verification flow can fail with.
///
/// Boundaries match on this exhaustively to pick a transport response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No challenge is assigned to the session; the client must fetch one.
    NewChallengeNeeded,
    /// The device has never completed attestation.
    AttestationRequired,
    /// The request payload is malformed or failed verification.
    BadRequest,
    /// A collaborator failed on the server side.
    Internal,
}

/// Error produced by the verification adapters.
///
/// Every plugin or service failure is folded into exactly one variant. The
/// message carries the collaborator's cause for logs and must never be
/// written to a response body.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("no challenge assigned")]
    NewChallengeNeeded,

    #[error("attestation required")]
    AttestationRequired,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AdapterError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// The taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NewChallengeNeeded => ErrorKind::NewChallengeNeeded,
            Self::AttestationRequired => ErrorKind::AttestationRequired,
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(AdapterError::NewChallengeNeeded.kind(), ErrorKind::NewChallengeNeeded);
        assert_eq!(AdapterError::AttestationRequired.kind(), ErrorKind::AttestationRequired);
        assert_eq!(AdapterError::bad_request("x").kind(), ErrorKind::BadRequest);
        assert_eq!(AdapterError::internal("x").kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_display_keeps_cause_for_logs() {
        let err = AdapterError::internal("failed to store result: disk full");
        assert_eq!(err.to_string(), "internal error: failed to store result: disk full");
    }
}
