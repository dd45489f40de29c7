use actix_web::{cookie::Cookie, HttpRequest};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::passkey::{CeremonyKind, PasskeyError};
use crate::settings::PassgateSettings;
use crate::utils::crypto::{decrypt_data, derive_encryption_key, encrypt_data};

/// Cookie carrying the registration ticket between begin and finish
pub const REGISTRATION_COOKIE: &str = "passgate_registration";
/// Cookie carrying the authentication ticket between begin and finish
pub const AUTHENTICATION_COOKIE: &str = "passgate_authentication";

/// Options for cookie creation
pub struct CookieOptions {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: actix_web::cookie::SameSite,
    pub path: String,
    pub max_age: actix_web::cookie::time::Duration,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: actix_web::cookie::SameSite::Strict,
            path: "/".to_string(),
            max_age: actix_web::cookie::time::Duration::minutes(5),
        }
    }
}

/// Sealed pointer to a pending ceremony
///
/// The challenge itself stays on the server; the ticket only names the
/// session token and who it was issued for.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CeremonyTicket {
    pub token: String,
    pub user_name: String,
    pub kind: CeremonyKind,
    pub issued_at: DateTime<Utc>,
}

impl CeremonyTicket {
    #[must_use]
    pub fn new(token: String, user_name: &str, kind: CeremonyKind) -> Self {
        Self {
            token,
            user_name: user_name.to_string(),
            kind,
            issued_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionDecodeError {
    /// Undecodable, tampered with, or sealed under another key
    #[error("ceremony ticket could not be opened: {0}")]
    Malformed(String),

    #[error("ceremony ticket is for {actual}, expected {expected}")]
    KindMismatch {
        expected: CeremonyKind,
        actual: CeremonyKind,
    },
}

impl From<SessionDecodeError> for PasskeyError {
    fn from(err: SessionDecodeError) -> Self {
        Self::SessionDecode(err.to_string())
    }
}

/// Cookie factory for sealed ceremony tickets
#[derive(Clone)]
pub struct CeremonyCookieFactory {
    encryption_key: [u8; 32],
    cookie_secure: bool,
    ticket_ttl_seconds: i64,
}

impl CeremonyCookieFactory {
    /// Create a factory; the AES key is derived from `session_secret`
    #[must_use]
    pub fn new(session_secret: &str, cookie_secure: bool, ticket_ttl_seconds: i64) -> Self {
        Self {
            encryption_key: derive_encryption_key(session_secret.as_bytes()),
            cookie_secure,
            ticket_ttl_seconds,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &PassgateSettings) -> Self {
        Self::new(
            &settings.session.session_secret,
            settings.cookies.secure,
            settings.challenge_ttl_seconds(),
        )
    }

    #[must_use]
    pub fn cookie_name(kind: CeremonyKind) -> &'static str {
        match kind {
            CeremonyKind::Registration => REGISTRATION_COOKIE,
            CeremonyKind::Authentication => AUTHENTICATION_COOKIE,
        }
    }

    /// Generic method to create a cookie with encrypted data
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_cookie<T: Serialize>(
        &self,
        name: &str,
        data: Option<&T>,
        options: CookieOptions,
    ) -> Result<Cookie<'static>> {
        let value = match data {
            Some(data) => encrypt_data(data, &self.encryption_key)?,
            None => String::new(),
        };

        Ok(Cookie::build(name.to_owned(), value)
            .http_only(options.http_only)
            .secure(self.cookie_secure && options.secure)
            .same_site(options.same_site)
            .path(options.path)
            .max_age(options.max_age)
            .finish())
    }

    /// Seal `ticket` into its ceremony cookie
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn create_ticket_cookie(&self, ticket: &CeremonyTicket) -> Result<Cookie<'static>> {
        self.create_cookie(
            Self::cookie_name(ticket.kind),
            Some(ticket),
            CookieOptions {
                max_age: actix_web::cookie::time::Duration::seconds(self.ticket_ttl_seconds),
                ..Default::default()
            },
        )
    }

    /// Expired, empty cookie that makes the browser drop the ticket
    #[must_use]
    pub fn clear_cookie(&self, kind: CeremonyKind) -> Cookie<'static> {
        let mut cookie = Cookie::build(Self::cookie_name(kind), "")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(actix_web::cookie::SameSite::Strict)
            .path("/")
            .finish();
        cookie.make_removal();
        cookie
    }

    /// Open the ticket for `kind` carried by `req`
    ///
    /// Returns `Ok(None)` when the cookie is absent or empty.
    ///
    /// # Errors
    ///
    /// `Malformed` if the cookie cannot be decrypted or does not match the
    /// ticket schema, `KindMismatch` if it names another ceremony
    pub fn read_ticket(
        &self,
        req: &HttpRequest,
        kind: CeremonyKind,
    ) -> Result<Option<CeremonyTicket>, SessionDecodeError> {
        let Some(cookie) = req.cookie(Self::cookie_name(kind)) else {
            return Ok(None);
        };
        if cookie.value().is_empty() {
            return Ok(None);
        }
        self.open_ticket(cookie.value(), kind).map(Some)
    }

    /// Decrypt and validate a sealed ticket value
    ///
    /// # Errors
    ///
    /// See [`Self::read_ticket`]
    pub fn open_ticket(
        &self,
        sealed: &str,
        kind: CeremonyKind,
    ) -> Result<CeremonyTicket, SessionDecodeError> {
        let ticket: CeremonyTicket = decrypt_data(sealed, &self.encryption_key)
            .map_err(|e| SessionDecodeError::Malformed(e.to_string()))?;
        if ticket.kind != kind {
            return Err(SessionDecodeError::KindMismatch {
                expected: kind,
                actual: ticket.kind,
            });
        }
        Ok(ticket)
    }
}

impl std::fmt::Debug for CeremonyCookieFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyCookieFactory")
            .field("cookie_secure", &self.cookie_secure)
            .field("ticket_ttl_seconds", &self.ticket_ttl_seconds)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn factory() -> CeremonyCookieFactory {
        CeremonyCookieFactory::new("unit-test-secret", false, 300)
    }

    #[test]
    fn test_ticket_cookie_attributes() {
        let ticket = CeremonyTicket::new("tok".into(), "alice", CeremonyKind::Registration);
        let cookie = factory().create_ticket_cookie(&ticket).unwrap();
        assert_eq!(cookie.name(), REGISTRATION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(
            cookie.same_site(),
            Some(actix_web::cookie::SameSite::Strict)
        );
        assert_eq!(
            cookie.max_age(),
            Some(actix_web::cookie::time::Duration::seconds(300))
        );
        assert!(!cookie.value().contains("alice"));
    }

    #[test]
    fn test_read_ticket_from_request() {
        let factory = factory();
        let ticket = CeremonyTicket::new("tok".into(), "alice", CeremonyKind::Authentication);
        let cookie = factory.create_ticket_cookie(&ticket).unwrap();

        let req = TestRequest::default().cookie(cookie).to_http_request();
        let opened = factory
            .read_ticket(&req, CeremonyKind::Authentication)
            .unwrap()
            .unwrap();
        assert_eq!(opened, ticket);
    }

    #[test]
    fn test_missing_cookie_is_none() {
        let req = TestRequest::default().to_http_request();
        assert_eq!(
            factory().read_ticket(&req, CeremonyKind::Registration),
            Ok(None)
        );
    }

    #[test]
    fn test_tampered_cookie_is_decode_error() {
        let req = TestRequest::default()
            .cookie(Cookie::new(REGISTRATION_COOKIE, "bm90IGEgdGlja2V0"))
            .to_http_request();
        assert!(matches!(
            factory().read_ticket(&req, CeremonyKind::Registration),
            Err(SessionDecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_foreign_key_is_decode_error() {
        let ticket = CeremonyTicket::new("tok".into(), "alice", CeremonyKind::Registration);
        let cookie = CeremonyCookieFactory::new("other-secret", false, 300)
            .create_ticket_cookie(&ticket)
            .unwrap();
        assert!(matches!(
            factory().open_ticket(cookie.value(), CeremonyKind::Registration),
            Err(SessionDecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_wrong_schema_is_decode_error() {
        let factory = factory();
        let sealed = encrypt_data(
            &serde_json::json!({"token": "tok", "kind": "registration"}),
            &factory.encryption_key,
        )
        .unwrap();
        assert!(matches!(
            factory.open_ticket(&sealed, CeremonyKind::Registration),
            Err(SessionDecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_wrong_kind_is_decode_error() {
        let factory = factory();
        let ticket = CeremonyTicket::new("tok".into(), "alice", CeremonyKind::Registration);
        let cookie = factory.create_ticket_cookie(&ticket).unwrap();
        assert_eq!(
            factory.open_ticket(cookie.value(), CeremonyKind::Authentication),
            Err(SessionDecodeError::KindMismatch {
                expected: CeremonyKind::Authentication,
                actual: CeremonyKind::Registration,
            })
        );
    }

    #[test]
    fn test_clear_cookie_expires() {
        let cookie = factory().clear_cookie(CeremonyKind::Registration);
        assert_eq!(cookie.value(), "");
        assert_eq!(
            cookie.max_age(),
            Some(actix_web::cookie::time::Duration::ZERO)
        );
    }
}
