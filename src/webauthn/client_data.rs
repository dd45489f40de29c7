//! Collected client data (`clientDataJSON`) parsing and checks

use serde::Deserialize;

use super::errors::WebAuthnError;
use super::types::decode_base64url;

/// Which ceremony a `clientDataJSON` was produced for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CeremonyType {
    Create,
    Get,
}

impl CeremonyType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "webauthn.create",
            Self::Get => "webauthn.get",
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub type_: String,
    /// base64url challenge as echoed by the browser
    pub challenge: String,
    pub origin: String,
    #[serde(default)]
    pub cross_origin: Option<bool>,
    #[serde(default)]
    pub top_origin: Option<String>,
}

impl CollectedClientData {
    /// Parse raw `clientDataJSON` bytes
    ///
    /// # Errors
    /// Returns `Encoding` if the bytes are not the expected JSON object
    pub fn from_json(bytes: &[u8]) -> Result<Self, WebAuthnError> {
        serde_json::from_slice(bytes)
            .map_err(|e| WebAuthnError::Encoding(format!("Invalid clientDataJSON: {e}")))
    }

    /// Check type, challenge, origin and cross-origin flag, in that order
    ///
    /// # Errors
    /// Returns the first failed check
    pub fn verify(
        &self,
        ceremony: CeremonyType,
        expected_challenge: &[u8],
        expected_origin: &str,
    ) -> Result<(), WebAuthnError> {
        if self.type_ != ceremony.as_str() {
            return Err(WebAuthnError::ClientDataType {
                expected: ceremony.as_str(),
                actual: self.type_.clone(),
            });
        }

        let challenge =
            decode_base64url(&self.challenge).map_err(|_| WebAuthnError::ChallengeMismatch)?;
        if challenge != expected_challenge {
            return Err(WebAuthnError::ChallengeMismatch);
        }

        if self.origin != expected_origin {
            return Err(WebAuthnError::OriginMismatch(self.origin.clone()));
        }

        if self.cross_origin == Some(true) {
            return Err(WebAuthnError::OriginMismatch(format!(
                "cross-origin request from {}",
                self.top_origin.as_deref().unwrap_or("unknown top origin")
            )));
        }

        Ok(())
    }
}
