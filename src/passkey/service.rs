//! Passkey ceremony service
//!
//! Ties the stateless `WebAuthnService` to the credential store and the
//! challenge manager. Each finish call consumes its session first, so a
//! failed attempt cannot be retried against the same challenge.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use super::challenge::{CeremonyKind, CeremonyState, ChallengeError, ChallengeManager, ChallengeSession};
use super::errors::PasskeyError;
use super::store::{CredentialStore, MemoryCredentialStore};
use super::types::User;
use crate::settings::PassgateSettings;
use crate::utils::logging::LoggingHelper;
use crate::validation::validate_username;
use crate::webauthn::{
    AuthenticationResult, Credential, CredentialAssertion, CredentialCreation,
    PublicKeyCredential, RegisterPublicKeyCredential, WebAuthnError, WebAuthnService,
};

/// Options for a new registration plus the token identifying its session
#[derive(Debug)]
pub struct RegistrationStart {
    pub options: CredentialCreation,
    pub token: String,
}

/// Options for a new login plus the token identifying its session
#[derive(Debug)]
pub struct AuthenticationStart {
    pub options: CredentialAssertion,
    pub token: String,
}

pub struct PasskeyService {
    webauthn: WebAuthnService,
    store: Arc<dyn CredentialStore>,
    challenges: ChallengeManager,
}

impl PasskeyService {
    #[must_use]
    pub fn new(
        webauthn: WebAuthnService,
        store: Arc<dyn CredentialStore>,
        challenges: ChallengeManager,
    ) -> Self {
        Self {
            webauthn,
            store,
            challenges,
        }
    }

    /// Build a service over an in-memory store from application settings
    ///
    /// # Errors
    /// `Configuration` if the relying party settings are invalid
    pub fn from_settings(settings: &PassgateSettings) -> Result<Self, WebAuthnError> {
        let webauthn = WebAuthnService::new(settings.relying_party.clone())?;
        Ok(Self::new(
            webauthn,
            Arc::new(MemoryCredentialStore::new()),
            ChallengeManager::new(settings.challenge_ttl()),
        ))
    }

    #[must_use]
    pub fn webauthn(&self) -> &WebAuthnService {
        &self.webauthn
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    #[must_use]
    pub fn challenges(&self) -> &ChallengeManager {
        &self.challenges
    }

    /// Start registering a credential for `username`, creating the user on first sight
    ///
    /// # Errors
    /// `InvalidInput` for a bad username; store failures otherwise
    pub fn begin_registration(&self, username: &str) -> Result<RegistrationStart, PasskeyError> {
        validate_username(username)?;

        let candidate = User::new(username);
        let candidate_id = candidate.id.clone();
        let user = self.store.insert_user_if_absent(candidate)?;
        if user.id == candidate_id {
            LoggingHelper::log_user_created(username);
        }

        let challenge = self.challenges.generate_challenge();
        let (options, state) =
            self.webauthn
                .start_registration(&user.entity(), challenge, &user.credentials);
        let (token, _) = self.challenges.begin(
            &user.id,
            &user.name,
            CeremonyState::Registration(state),
        );

        Ok(RegistrationStart { options, token })
    }

    /// Verify an attestation and store the new credential
    ///
    /// # Errors
    /// Any `PasskeyError`; nothing is stored on failure
    pub fn finish_registration(
        &self,
        username: &str,
        token: &str,
        response: &RegisterPublicKeyCredential,
    ) -> Result<Credential, PasskeyError> {
        let result = self.try_finish_registration(username, token, response);
        match &result {
            Ok(credential) => LoggingHelper::log_ceremony_success(
                "Registration",
                username,
                &URL_SAFE_NO_PAD.encode(&credential.credential_id),
            ),
            Err(err) => LoggingHelper::log_ceremony_failure("Registration", username, err),
        }
        result
    }

    fn try_finish_registration(
        &self,
        username: &str,
        token: &str,
        response: &RegisterPublicKeyCredential,
    ) -> Result<Credential, PasskeyError> {
        validate_username(username)?;
        let (session, user) = self.claim_session(username, token, CeremonyKind::Registration)?;
        let CeremonyState::Registration(mut state) = session.ceremony else {
            return Err(kind_mismatch(CeremonyKind::Registration));
        };

        // Credentials added since begin are excluded too
        state.exclude_credentials = user.credential_ids();

        let credential = self.webauthn.finish_registration(response, &state)?;
        self.store.add_credential(username, credential.clone())?;
        Ok(credential)
    }

    /// Start a login for an existing user
    ///
    /// # Errors
    /// `InvalidInput`, `UserNotFound` (no challenge is issued) or `NoCredentials`
    pub fn begin_login(&self, username: &str) -> Result<AuthenticationStart, PasskeyError> {
        validate_username(username)?;

        let user = self.store.get_user(username)?;
        if user.credentials.is_empty() {
            return Err(PasskeyError::NoCredentials(username.to_string()));
        }

        let challenge = self.challenges.generate_challenge();
        let (options, state) =
            self.webauthn
                .start_authentication(&user.id, challenge, &user.credentials);
        let (token, _) = self.challenges.begin(
            &user.id,
            &user.name,
            CeremonyState::Authentication(state),
        );

        Ok(AuthenticationStart { options, token })
    }

    /// Verify an assertion and advance the credential's counter
    ///
    /// # Errors
    /// Any `PasskeyError`; the store is untouched on failure
    pub fn finish_login(
        &self,
        username: &str,
        token: &str,
        response: &PublicKeyCredential,
    ) -> Result<AuthenticationResult, PasskeyError> {
        let result = self.try_finish_login(username, token, response);
        match &result {
            Ok(outcome) => LoggingHelper::log_ceremony_success(
                "Login",
                username,
                &URL_SAFE_NO_PAD.encode(&outcome.credential_id),
            ),
            Err(err) => LoggingHelper::log_ceremony_failure("Login", username, err),
        }
        result
    }

    fn try_finish_login(
        &self,
        username: &str,
        token: &str,
        response: &PublicKeyCredential,
    ) -> Result<AuthenticationResult, PasskeyError> {
        validate_username(username)?;
        let (session, user) = self.claim_session(username, token, CeremonyKind::Authentication)?;
        let CeremonyState::Authentication(state) = session.ceremony else {
            return Err(kind_mismatch(CeremonyKind::Authentication));
        };

        let credential = user
            .credential(&response.raw_id)
            .ok_or(PasskeyError::UnknownCredential)?;

        let outcome = self
            .webauthn
            .finish_authentication(response, &state, credential)?;

        self.store
            .update_credential_usage(
                username,
                &credential.credential_id,
                credential.sign_count,
                &outcome,
            )?;

        Ok(outcome)
    }

    /// Consume the session behind `token` and load the user it was issued for
    fn claim_session(
        &self,
        username: &str,
        token: &str,
        kind: CeremonyKind,
    ) -> Result<(ChallengeSession, User), PasskeyError> {
        let session = self.challenges.consume(token, kind)?;
        if session.user_name != username {
            return Err(PasskeyError::SessionUserMismatch);
        }

        let user = self.store.get_user(username)?;
        if user.id != session.user_id {
            return Err(PasskeyError::SessionUserMismatch);
        }
        Ok((session, user))
    }
}

impl std::fmt::Debug for PasskeyService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeyService")
            .field("webauthn", &self.webauthn)
            .field("challenges", &self.challenges)
            .finish_non_exhaustive()
    }
}

fn kind_mismatch(expected: CeremonyKind) -> PasskeyError {
    let actual = match expected {
        CeremonyKind::Registration => CeremonyKind::Authentication,
        CeremonyKind::Authentication => CeremonyKind::Registration,
    };
    PasskeyError::Challenge(ChallengeError::KindMismatch { expected, actual })
}
