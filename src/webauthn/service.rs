//! `WebAuthn` service implementation
//!
//! This module provides the main `WebAuthn` service implementation,
//! handling registration and authentication operations. It is stateless:
//! ceremony state is handed out by the `start_*` calls and handed back to
//! the `finish_*` calls by the caller.

use chrono::Utc;
use log::debug;

use super::attestation::verify_attestation_statement;
use super::cbor::{AttestationObject, AuthenticatorData};
use super::client_data::{CeremonyType, CollectedClientData};
use super::cose::{CoseAlgorithm, CoseKey};
use super::crypto::sha256;
use super::errors::WebAuthnError;
use super::settings::WebAuthnSettings;
use super::types::{
    decode_base64url, AuthenticationResult, AuthenticationState, AuthenticatorSelectionCriteria,
    Base64UrlBytes, Credential, CredentialAssertion, CredentialCreation, PublicKeyCredential,
    PublicKeyCredentialCreationOptions, PublicKeyCredentialDescriptor,
    PublicKeyCredentialParameters, PublicKeyCredentialRequestOptions, RegisterPublicKeyCredential,
    RegistrationState, RelyingParty, UserEntity, PUBLIC_KEY_TYPE,
};

/// Core `WebAuthn` service
#[derive(Debug)]
pub struct WebAuthnService {
    settings: WebAuthnSettings,
    rp_id_hash: [u8; 32],
}

impl WebAuthnService {
    /// Create a new `WebAuthnService` with the given settings
    ///
    /// # Errors
    /// Returns `Configuration` or `UnsupportedAlgorithm` if the settings do
    /// not validate
    pub fn new(settings: WebAuthnSettings) -> Result<Self, WebAuthnError> {
        settings.validate()?;
        let rp_id_hash = sha256(settings.rp_id.as_bytes());
        Ok(Self {
            settings,
            rp_id_hash,
        })
    }

    #[must_use]
    pub fn settings(&self) -> &WebAuthnSettings {
        &self.settings
    }

    /// Create registration options for a new credential
    ///
    /// Every credential in `existing` is listed in `excludeCredentials` so the
    /// authenticator refuses to create a second credential for the same user.
    #[must_use]
    pub fn start_registration(
        &self,
        user: &UserEntity,
        challenge: Vec<u8>,
        existing: &[Credential],
    ) -> (CredentialCreation, RegistrationState) {
        let exclude_credentials: Vec<PublicKeyCredentialDescriptor> = existing
            .iter()
            .map(PublicKeyCredentialDescriptor::for_credential)
            .collect();

        let options = PublicKeyCredentialCreationOptions {
            challenge: Base64UrlBytes(challenge.clone()),
            rp: RelyingParty {
                id: self.settings.rp_id.clone(),
                name: self.settings.rp_name.clone(),
            },
            user: user.clone(),
            pub_key_cred_params: self
                .settings
                .algorithms
                .iter()
                .map(|alg| PublicKeyCredentialParameters {
                    type_: PUBLIC_KEY_TYPE.to_string(),
                    alg: *alg,
                })
                .collect(),
            timeout: self.settings.timeout_millis(),
            exclude_credentials,
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: self.settings.authenticator_attachment.clone(),
                resident_key: "preferred".to_string(),
                require_resident_key: false,
                user_verification: self.settings.user_verification,
            },
            attestation: self.settings.attestation,
        };

        let state = RegistrationState {
            user_id: user.id.to_vec(),
            challenge,
            user_verification: self.settings.user_verification,
            exclude_credentials: existing.iter().map(|c| c.credential_id.clone()).collect(),
            created_at: Utc::now(),
        };

        (
            CredentialCreation {
                public_key: options,
            },
            state,
        )
    }

    /// Complete registration with client response
    ///
    /// # Errors
    /// Returns the first failed check: client data (type, challenge, origin),
    /// authenticator data (RP ID hash, flags, credential data), public key,
    /// attestation statement or exclude list
    pub fn finish_registration(
        &self,
        response: &RegisterPublicKeyCredential,
        state: &RegistrationState,
    ) -> Result<Credential, WebAuthnError> {
        check_credential_type(&response.type_)?;

        let client_data_json = &response.response.client_data_json;
        let client_data = CollectedClientData::from_json(client_data_json)?;
        client_data.verify(
            CeremonyType::Create,
            &state.challenge,
            &self.settings.rp_origin,
        )?;
        let client_data_hash = sha256(client_data_json);

        let attestation = AttestationObject::from_bytes(&response.response.attestation_object)?;
        let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
        self.check_authenticator_data(&auth_data, state.user_verification.is_required())?;

        let attested = auth_data
            .attested_credential
            .as_ref()
            .ok_or_else(|| {
                WebAuthnError::InvalidAuthenticatorData(
                    "Attested credential data missing".to_string(),
                )
            })?;

        if attested.credential_id != response.raw_id.as_ref() {
            return Err(WebAuthnError::InvalidAuthenticatorData(
                "Credential ID does not match rawId".to_string(),
            ));
        }
        check_id_matches_raw_id(&response.id, &response.raw_id)?;

        let cose_key = CoseKey::from_cbor(&attested.public_key)?;
        let algorithm = cose_key.algorithm();
        if !self.settings.algorithms.contains(&algorithm.id()) {
            return Err(WebAuthnError::UnsupportedAlgorithm(algorithm.id()));
        }

        let attestation_type =
            verify_attestation_statement(&attestation, &auth_data, &client_data_hash, &cose_key)?;
        debug!(
            "Attestation format {} verified as {attestation_type:?}",
            attestation.fmt
        );

        if state
            .exclude_credentials
            .iter()
            .any(|id| *id == attested.credential_id)
        {
            return Err(WebAuthnError::CredentialAlreadyRegistered);
        }

        let now = Utc::now();
        Ok(Credential {
            credential_id: attested.credential_id.clone(),
            public_key: attested.public_key.clone(),
            algorithm: algorithm.id(),
            sign_count: auth_data.sign_count,
            transports: response.response.transports.clone(),
            backup_eligible: auth_data.flags.backup_eligible(),
            backup_state: auth_data.flags.backup_state(),
            user_verified: auth_data.flags.user_verified(),
            aaguid: attested.aaguid,
            attestation_format: attestation.fmt.clone(),
            created_at: now,
            last_used: None,
        })
    }

    /// Create authentication options for the given credentials
    #[must_use]
    pub fn start_authentication(
        &self,
        user_id: &[u8],
        challenge: Vec<u8>,
        credentials: &[Credential],
    ) -> (CredentialAssertion, AuthenticationState) {
        let options = PublicKeyCredentialRequestOptions {
            challenge: Base64UrlBytes(challenge.clone()),
            timeout: self.settings.timeout_millis(),
            rp_id: self.settings.rp_id.clone(),
            allow_credentials: credentials
                .iter()
                .map(PublicKeyCredentialDescriptor::for_credential)
                .collect(),
            user_verification: self.settings.user_verification,
        };

        let state = AuthenticationState {
            user_id: user_id.to_vec(),
            challenge,
            user_verification: self.settings.user_verification,
            allow_credentials: credentials
                .iter()
                .map(|c| c.credential_id.clone())
                .collect(),
            created_at: Utc::now(),
        };

        (
            CredentialAssertion {
                public_key: options,
            },
            state,
        )
    }

    /// Complete authentication with client response
    ///
    /// `credential` is the stored credential matching `response.raw_id`. The
    /// signature is checked before the counter, so a forged assertion never
    /// reports a counter regression.
    ///
    /// # Errors
    /// Returns the first failed check, ending with `InvalidSignature` or
    /// `CounterRegression`
    pub fn finish_authentication(
        &self,
        response: &PublicKeyCredential,
        state: &AuthenticationState,
        credential: &Credential,
    ) -> Result<AuthenticationResult, WebAuthnError> {
        check_credential_type(&response.type_)?;

        let raw_id = response.raw_id.as_ref();
        if !state.allow_credentials.iter().any(|id| id == raw_id)
            || credential.credential_id != raw_id
        {
            return Err(WebAuthnError::CredentialNotAllowed);
        }
        check_id_matches_raw_id(&response.id, &response.raw_id)?;

        if let Some(user_handle) = &response.response.user_handle {
            if !user_handle.is_empty() && user_handle.as_ref() != state.user_id.as_slice() {
                return Err(WebAuthnError::UserHandleMismatch);
            }
        }

        let client_data_json = &response.response.client_data_json;
        let client_data = CollectedClientData::from_json(client_data_json)?;
        client_data.verify(CeremonyType::Get, &state.challenge, &self.settings.rp_origin)?;

        let raw_auth_data = &response.response.authenticator_data;
        let auth_data = AuthenticatorData::parse(raw_auth_data)?;
        self.check_authenticator_data(&auth_data, state.user_verification.is_required())?;

        if auth_data.flags.backup_eligible() != credential.backup_eligible {
            return Err(WebAuthnError::BackupEligibilityChanged);
        }

        let cose_key = CoseKey::from_cbor(&credential.public_key)?;
        if cose_key.algorithm() != CoseAlgorithm::from_id(credential.algorithm)? {
            return Err(WebAuthnError::InvalidPublicKey(
                "Stored algorithm does not match stored key".to_string(),
            ));
        }
        let mut signed = Vec::with_capacity(raw_auth_data.len() + 32);
        signed.extend_from_slice(raw_auth_data);
        signed.extend_from_slice(&sha256(client_data_json));
        cose_key.verify_signature(&signed, &response.response.signature)?;

        check_sign_count(credential.sign_count, auth_data.sign_count)?;

        Ok(AuthenticationResult {
            credential_id: credential.credential_id.clone(),
            sign_count: auth_data.sign_count,
            user_verified: auth_data.flags.user_verified(),
            backup_state: auth_data.flags.backup_state(),
            authenticated_at: Utc::now(),
        })
    }

    fn check_authenticator_data(
        &self,
        auth_data: &AuthenticatorData,
        user_verification_required: bool,
    ) -> Result<(), WebAuthnError> {
        if auth_data.rp_id_hash != self.rp_id_hash {
            return Err(WebAuthnError::RpIdMismatch);
        }
        if !auth_data.flags.user_present() {
            return Err(WebAuthnError::UserPresenceRequired);
        }
        if user_verification_required && !auth_data.flags.user_verified() {
            return Err(WebAuthnError::UserVerificationRequired);
        }
        if auth_data.flags.backup_state() && !auth_data.flags.backup_eligible() {
            return Err(WebAuthnError::InvalidAuthenticatorData(
                "Backup state set on a credential that is not backup eligible".to_string(),
            ));
        }
        Ok(())
    }
}

/// Apply the signature counter rule
///
/// The received counter must be strictly greater than the stored one. An
/// authenticator that never increments (both values zero) is accepted.
///
/// # Errors
/// Returns `CounterRegression` for any other combination
pub fn check_sign_count(stored: u32, received: u32) -> Result<(), WebAuthnError> {
    if received > stored || (stored == 0 && received == 0) {
        Ok(())
    } else {
        Err(WebAuthnError::CounterRegression { stored, received })
    }
}

fn check_credential_type(type_: &str) -> Result<(), WebAuthnError> {
    if type_ == PUBLIC_KEY_TYPE {
        Ok(())
    } else {
        Err(WebAuthnError::Encoding(format!(
            "Unsupported credential type: {type_}"
        )))
    }
}

fn check_id_matches_raw_id(id: &str, raw_id: &Base64UrlBytes) -> Result<(), WebAuthnError> {
    if decode_base64url(id)? == raw_id.as_ref() {
        Ok(())
    } else {
        Err(WebAuthnError::Encoding("Credential id does not match rawId".to_string()))
    }
}
