//! Pre-built test objects shared by unit and integration tests

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::passkey::{ChallengeManager, MemoryCredentialStore, PasskeyService};
use crate::session::CeremonyCookieFactory;
use crate::webauthn::{AuthenticatorTransport, Credential, WebAuthnService, WebAuthnSettings};

/// Relying party ID of the default settings
pub const TEST_RP_ID: &str = "localhost";
/// Origin of the default settings
pub const TEST_ORIGIN: &str = "http://localhost:8080";
/// Secret used to seal ceremony tickets in tests
pub const TEST_SESSION_SECRET: &str = "passgate-test-session-secret";
/// Challenge lifetime used by the fixtures
pub const TEST_CHALLENGE_TTL_SECONDS: i64 = 300;

/// A stored credential with placeholder key material
#[must_use]
pub fn credential_with_id(id: &[u8]) -> Credential {
    Credential {
        credential_id: id.to_vec(),
        public_key: vec![0xa0],
        algorithm: -7,
        sign_count: 0,
        transports: vec![AuthenticatorTransport::Internal],
        backup_eligible: false,
        backup_state: false,
        user_verified: true,
        aaguid: [0; 16],
        attestation_format: "none".to_string(),
        created_at: Utc::now(),
        last_used: None,
    }
}

/// Passkey service over the default relying party and an empty store
///
/// # Panics
/// If the default relying party settings do not validate
#[must_use]
pub fn test_passkey_service() -> PasskeyService {
    test_passkey_service_with(WebAuthnSettings::default(), Duration::seconds(TEST_CHALLENGE_TTL_SECONDS))
}

/// Passkey service over custom relying party settings and challenge lifetime
///
/// # Panics
/// If `settings` do not validate
#[must_use]
pub fn test_passkey_service_with(settings: WebAuthnSettings, ttl: Duration) -> PasskeyService {
    PasskeyService::new(
        WebAuthnService::new(settings).expect("valid relying party settings"),
        Arc::new(MemoryCredentialStore::new()),
        ChallengeManager::new(ttl),
    )
}

/// Cookie factory sealing with [`TEST_SESSION_SECRET`]
#[must_use]
pub fn test_cookie_factory() -> CeremonyCookieFactory {
    CeremonyCookieFactory::new(TEST_SESSION_SECRET, false, TEST_CHALLENGE_TTL_SECONDS)
}
