//! `WebAuthn` core types
//!
//! This module defines the wire structures exchanged with the browser
//! (options and credential responses), the ceremony state kept between
//! begin and finish, and the stored credential record.

use std::fmt;
use std::ops::Deref;

use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::WebAuthnError;

/// Decode base64url data, tolerating padding and the standard alphabet
///
/// # Errors
/// Returns `WebAuthnError::Encoding` if the input is not valid base64
pub fn decode_base64url(input: &str) -> Result<Vec<u8>, WebAuthnError> {
    let trimmed = input.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|_| WebAuthnError::Encoding("Invalid base64url data".to_string()))
}

/// Binary data carried as unpadded base64url in JSON
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Base64UrlBytes(pub Vec<u8>);

impl Base64UrlBytes {
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl Deref for Base64UrlBytes {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Base64UrlBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Base64UrlBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Base64UrlBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Debug for Base64UrlBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl Serialize for Base64UrlBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&URL_SAFE_NO_PAD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64UrlBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        decode_base64url(&encoded)
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}

// ===============================
// POLICY ENUMS
// ===============================

/// User verification requirement ("required", "preferred", "discouraged")
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    #[default]
    Preferred,
    Discouraged,
}

impl UserVerificationRequirement {
    #[must_use]
    pub fn is_required(self) -> bool {
        self == Self::Required
    }
}

/// Attestation conveyance preference ("none", "indirect", "direct", "enterprise")
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

/// Transport hints reported by authenticators
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    SmartCard,
    Hybrid,
    Internal,
    #[serde(other)]
    Unknown,
}

// ===============================
// OPTIONS SENT TO THE CLIENT
// ===============================

/// Registration options wrapper, shaped for `navigator.credentials.create()`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreation {
    pub public_key: PublicKeyCredentialCreationOptions,
}

/// `WebAuthn` registration options sent to the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialCreationOptions {
    pub challenge: Base64UrlBytes,
    pub rp: RelyingParty,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PublicKeyCredentialParameters>,
    /// Timeout in milliseconds
    pub timeout: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    pub attestation: AttestationConveyancePreference,
}

/// Authentication options wrapper, shaped for `navigator.credentials.get()`
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CredentialAssertion {
    pub public_key: PublicKeyCredentialRequestOptions,
}

/// `WebAuthn` authentication options sent to the client
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredentialRequestOptions {
    pub challenge: Base64UrlBytes,
    pub timeout: u32,
    pub rp_id: String,
    pub allow_credentials: Vec<PublicKeyCredentialDescriptor>,
    pub user_verification: UserVerificationRequirement,
}

/// `WebAuthn` relying party information
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RelyingParty {
    pub id: String,   // Domain name (e.g., "example.com")
    pub name: String, // Display name
}

/// `WebAuthn` user entity
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub id: Base64UrlBytes, // User handle
    pub name: String,       // Username (e.g., email)
    pub display_name: String,
}

/// Public key credential parameters
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicKeyCredentialParameters {
    #[serde(rename = "type")]
    pub type_: String, // Always "public-key"
    pub alg: i64,      // COSE algorithm identifier
}

/// Authenticator selection criteria
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelectionCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>, // "platform", "cross-platform"
    pub resident_key: String,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
}

/// Public key credential descriptor
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PublicKeyCredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String, // Always "public-key"
    pub id: Base64UrlBytes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<AuthenticatorTransport>,
}

impl PublicKeyCredentialDescriptor {
    #[must_use]
    pub fn for_credential(credential: &Credential) -> Self {
        Self {
            type_: PUBLIC_KEY_TYPE.to_string(),
            id: Base64UrlBytes(credential.credential_id.clone()),
            transports: credential
                .transports
                .iter()
                .copied()
                .filter(|transport| *transport != AuthenticatorTransport::Unknown)
                .collect(),
        }
    }
}

/// The only credential type defined by `WebAuthn`
pub const PUBLIC_KEY_TYPE: &str = "public-key";

// ===============================
// RESPONSES FROM THE CLIENT
// ===============================

/// Registration response from client (`PublicKeyCredential` with attestation)
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPublicKeyCredential {
    pub id: String,
    pub raw_id: Base64UrlBytes,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AuthenticatorAttestationResponse,
    #[serde(default)]
    pub authenticator_attachment: Option<String>,
    #[serde(default)]
    pub client_extension_results: Option<serde_json::Value>,
}

/// Authenticator attestation response during registration
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64UrlBytes,
    pub attestation_object: Base64UrlBytes,
    #[serde(default)]
    pub transports: Vec<AuthenticatorTransport>,
}

/// Authentication response from client (`PublicKeyCredential` with assertion)
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyCredential {
    pub id: String,
    pub raw_id: Base64UrlBytes,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AuthenticatorAssertionResponse,
    #[serde(default)]
    pub client_extension_results: Option<serde_json::Value>,
}

/// Authenticator assertion response during authentication
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorAssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: Base64UrlBytes,
    pub authenticator_data: Base64UrlBytes,
    pub signature: Base64UrlBytes,
    #[serde(default)]
    pub user_handle: Option<Base64UrlBytes>,
}

// ===============================
// CEREMONY STATE
// ===============================

/// State kept between registration begin and finish
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RegistrationState {
    pub user_id: Vec<u8>,
    pub challenge: Vec<u8>,
    pub user_verification: UserVerificationRequirement,
    pub exclude_credentials: Vec<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

/// State kept between authentication begin and finish
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AuthenticationState {
    pub user_id: Vec<u8>,
    pub challenge: Vec<u8>,
    pub user_verification: UserVerificationRequirement,
    pub allow_credentials: Vec<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

// ===============================
// VERIFIED RESULTS
// ===============================

/// A registered public key credential
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub credential_id: Vec<u8>,
    /// COSE-encoded public key
    pub public_key: Vec<u8>,
    /// COSE algorithm identifier of `public_key`
    pub algorithm: i64,
    pub sign_count: u32,
    pub transports: Vec<AuthenticatorTransport>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub user_verified: bool,
    pub aaguid: [u8; 16],
    pub attestation_format: String,
    pub created_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
}

/// Outcome of a verified assertion, to be written back to the store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AuthenticationResult {
    pub credential_id: Vec<u8>,
    pub sign_count: u32,
    pub user_verified: bool,
    pub backup_state: bool,
    pub authenticated_at: DateTime<Utc>,
}
