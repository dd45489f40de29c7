//! Passkey error types
//!
//! `PasskeyError` is what the HTTP layer sees. Every variant renders as a
//! `400 Bad Request` with a `{"code", "message"}` body.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

use super::challenge::ChallengeError;
use super::store::StoreError;
use crate::utils::responses::{ErrorResponse, ResponseBuilder};
use crate::webauthn::WebAuthnError;

/// Broad error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    NotFound,
    Challenge,
    CryptoVerification,
    CounterRegression,
    SessionDecode,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasskeyError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User {0} has no registered credentials")]
    NoCredentials(String),

    #[error("Unknown credential")]
    UnknownCredential,

    #[error("Credential already registered")]
    DuplicateCredential,

    #[error(transparent)]
    Challenge(#[from] ChallengeError),

    /// The ceremony session was issued for another user name
    #[error("Ceremony session does not belong to this user")]
    SessionUserMismatch,

    #[error("Invalid ceremony session: {0}")]
    SessionDecode(String),

    #[error("Signature counter regression: stored {stored}, received {received}")]
    CounterRegression { stored: u32, received: u32 },

    #[error(transparent)]
    Verification(WebAuthnError),
}

impl PasskeyError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::Input,
            Self::UserNotFound(_) | Self::NoCredentials(_) | Self::UnknownCredential => {
                ErrorKind::NotFound
            }
            Self::DuplicateCredential => ErrorKind::Conflict,
            Self::Challenge(_) | Self::SessionUserMismatch => ErrorKind::Challenge,
            Self::SessionDecode(_) => ErrorKind::SessionDecode,
            Self::CounterRegression { .. } => ErrorKind::CounterRegression,
            Self::Verification(err) => match err {
                WebAuthnError::Encoding(_) => ErrorKind::Input,
                WebAuthnError::ChallengeMismatch => ErrorKind::Challenge,
                _ => ErrorKind::CryptoVerification,
            },
        }
    }

    /// Stable machine-readable code
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::UserNotFound(_) => "user_not_found",
            Self::NoCredentials(_) => "no_credentials",
            Self::UnknownCredential => "unknown_credential",
            Self::DuplicateCredential => "duplicate_credential",
            Self::Challenge(ChallengeError::NotFound) => "challenge_not_found",
            Self::Challenge(ChallengeError::Expired) => "challenge_expired",
            Self::Challenge(ChallengeError::KindMismatch { .. }) => "ceremony_mismatch",
            Self::SessionUserMismatch => "session_user_mismatch",
            Self::SessionDecode(_) => "invalid_session",
            Self::CounterRegression { .. } => "counter_regression",
            Self::Verification(err) => err.code(),
        }
    }

    /// Human-readable message
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the failure deserves a security log entry
    #[must_use]
    pub fn is_security_relevant(&self) -> bool {
        match self {
            Self::CounterRegression { .. } | Self::SessionDecode(_) | Self::SessionUserMismatch => {
                true
            }
            Self::Verification(err) => err.is_security_relevant(),
            _ => false,
        }
    }
}

impl From<WebAuthnError> for PasskeyError {
    fn from(err: WebAuthnError) -> Self {
        match err {
            WebAuthnError::CounterRegression { stored, received } => {
                Self::CounterRegression { stored, received }
            }
            WebAuthnError::CredentialNotAllowed => Self::UnknownCredential,
            WebAuthnError::CredentialAlreadyRegistered => Self::DuplicateCredential,
            other => Self::Verification(other),
        }
    }
}

impl From<StoreError> for PasskeyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(name) => Self::UserNotFound(name),
            StoreError::CredentialNotFound => Self::UnknownCredential,
            StoreError::DuplicateCredential => Self::DuplicateCredential,
            // A concurrent assertion advanced the counter first; this one is stale
            StoreError::CounterConflict {
                actual, received, ..
            } => Self::CounterRegression {
                stored: actual,
                received,
            },
        }
    }
}

impl ResponseError for PasskeyError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        ResponseBuilder::bad_request(&ErrorResponse::new(self.code(), self.message()))
    }
}
