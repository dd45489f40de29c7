//! `WebAuthn` settings implementation
//!
//! This module defines the relying party configuration used by the ceremony
//! core, independent of application-specific settings.

use serde::{Deserialize, Serialize};
use url::Url;

use super::cose::CoseAlgorithm;
use super::errors::WebAuthnError;
use super::types::{AttestationConveyancePreference, UserVerificationRequirement};

/// Relying party settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebAuthnSettings {
    /// Relying Party ID (usually the domain)
    pub rp_id: String,
    /// Relying Party name (displayed to user)
    pub rp_name: String,
    /// Relying Party origin (e.g., <https://example.com>)
    pub rp_origin: String,
    /// Timeout in seconds advertised to the client
    pub timeout_seconds: u64,
    pub user_verification: UserVerificationRequirement,
    pub attestation: AttestationConveyancePreference,
    /// Optional authenticator attachment ("platform", "cross-platform")
    pub authenticator_attachment: Option<String>,
    /// COSE algorithm identifiers offered in creation options, in preference order
    pub algorithms: Vec<i64>,
}

impl Default for WebAuthnSettings {
    fn default() -> Self {
        Self {
            rp_id: "localhost".to_string(),
            rp_name: "Foobar Corp.".to_string(),
            rp_origin: "http://localhost:8080".to_string(),
            timeout_seconds: 300,
            user_verification: UserVerificationRequirement::Preferred,
            attestation: AttestationConveyancePreference::None,
            authenticator_attachment: None,
            algorithms: vec![
                CoseAlgorithm::ES256.id(),
                CoseAlgorithm::EdDSA.id(),
                CoseAlgorithm::RS256.id(),
            ],
        }
    }
}

impl WebAuthnSettings {
    /// Validate the relying party configuration
    ///
    /// # Errors
    /// Returns an error if:
    /// - The relying party ID is empty
    /// - The origin does not parse, or uses plain HTTP outside localhost
    /// - The origin host is not the RP ID or one of its subdomains
    /// - An algorithm is not supported by the verifier
    pub fn validate(&self) -> Result<(), WebAuthnError> {
        if self.rp_id.is_empty() {
            return Err(WebAuthnError::Configuration(
                "Relying party ID cannot be empty".into(),
            ));
        }

        let origin = Url::parse(&self.rp_origin).map_err(|e| {
            WebAuthnError::Configuration(format!("Invalid origin {}: {e}", self.rp_origin))
        })?;

        let Some(host) = origin.host_str() else {
            return Err(WebAuthnError::Configuration(
                "Origin must include a host".into(),
            ));
        };

        match origin.scheme() {
            "https" => {}
            "http" if host == "localhost" => {}
            _ => {
                return Err(WebAuthnError::Configuration(
                    "Origin must be https:// except for localhost".into(),
                ))
            }
        }

        if host != self.rp_id && !host.ends_with(&format!(".{}", self.rp_id)) {
            return Err(WebAuthnError::Configuration(format!(
                "Origin host {host} is not within RP ID {}",
                self.rp_id
            )));
        }

        if self.algorithms.is_empty() {
            return Err(WebAuthnError::Configuration(
                "At least one public key algorithm must be allowed".into(),
            ));
        }
        for alg in &self.algorithms {
            CoseAlgorithm::from_id(*alg)?;
        }

        Ok(())
    }

    /// Timeout advertised to the client, in milliseconds
    #[must_use]
    pub fn timeout_millis(&self) -> u32 {
        u32::try_from(self.timeout_seconds.saturating_mul(1000)).unwrap_or(u32::MAX)
    }
}
