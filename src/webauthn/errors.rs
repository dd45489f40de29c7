//! `WebAuthn` error types
//!
//! Verification-level failures raised while checking client data,
//! authenticator data, attestation statements and assertion signatures.

use thiserror::Error;

/// `WebAuthn` errors that can occur during ceremony verification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebAuthnError {
    /// Relying party configuration is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Data encoding/parsing error in the client payload
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// `clientDataJSON.type` does not match the ceremony
    #[error("Invalid client data type: expected {expected}, got {actual}")]
    ClientDataType {
        expected: &'static str,
        actual: String,
    },

    /// The signed challenge is not the one issued for this ceremony
    #[error("Challenge mismatch")]
    ChallengeMismatch,

    /// The client reported an origin other than the configured one
    #[error("Origin mismatch: {0}")]
    OriginMismatch(String),

    /// The authenticator scoped the credential to another relying party
    #[error("RP ID hash mismatch")]
    RpIdMismatch,

    #[error("User presence flag not set")]
    UserPresenceRequired,

    #[error("User verification required but not performed")]
    UserVerificationRequired,

    /// Malformed authenticator data
    #[error("Invalid authenticator data: {0}")]
    InvalidAuthenticatorData(String),

    /// Attestation statement missing, malformed or not verifiable
    #[error("Invalid attestation: {0}")]
    InvalidAttestation(String),

    #[error("Unsupported attestation format: {0}")]
    UnsupportedAttestationFormat(String),

    #[error("Unsupported COSE algorithm: {0}")]
    UnsupportedAlgorithm(i64),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Signature verification failed")]
    InvalidSignature,

    /// The authenticator already holds a credential for this user
    #[error("Credential is already registered")]
    CredentialAlreadyRegistered,

    /// The asserted credential was not offered in the allow list
    #[error("Credential not allowed for this ceremony")]
    CredentialNotAllowed,

    #[error("User handle mismatch")]
    UserHandleMismatch,

    /// Backup eligibility is fixed at creation and may never change
    #[error("Backup eligibility changed since registration")]
    BackupEligibilityChanged,

    /// Possible cloned authenticator
    #[error("Signature counter regression: stored {stored}, received {received}")]
    CounterRegression { stored: u32, received: u32 },
}

impl WebAuthnError {
    /// Stable machine-readable code used in error responses
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Encoding(_) => "invalid_payload",
            Self::ClientDataType { .. } => "client_data_type_mismatch",
            Self::ChallengeMismatch => "challenge_mismatch",
            Self::OriginMismatch(_) => "origin_mismatch",
            Self::RpIdMismatch => "rp_id_mismatch",
            Self::UserPresenceRequired => "user_presence_required",
            Self::UserVerificationRequired => "user_verification_required",
            Self::InvalidAuthenticatorData(_) => "invalid_authenticator_data",
            Self::InvalidAttestation(_) => "invalid_attestation",
            Self::UnsupportedAttestationFormat(_) => "unsupported_attestation_format",
            Self::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            Self::InvalidPublicKey(_) => "invalid_public_key",
            Self::InvalidSignature => "invalid_signature",
            Self::CredentialAlreadyRegistered => "duplicate_credential",
            Self::CredentialNotAllowed => "unknown_credential",
            Self::UserHandleMismatch => "user_handle_mismatch",
            Self::BackupEligibilityChanged => "backup_eligibility_changed",
            Self::CounterRegression { .. } => "counter_regression",
        }
    }

    /// Whether the error is a failed cryptographic check worth a security log entry
    #[must_use]
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            Self::InvalidSignature
                | Self::InvalidAttestation(_)
                | Self::RpIdMismatch
                | Self::OriginMismatch(_)
                | Self::UserHandleMismatch
                | Self::BackupEligibilityChanged
                | Self::CounterRegression { .. }
        )
    }
}
