//! Ceremony session transport
//!
//! Pending ceremonies live in the server-side `ChallengeManager`; the browser
//! only holds an encrypted ticket naming one of them.
//!
//! - [`cookie`] - Sealed ceremony ticket cookies

pub mod cookie;

pub use cookie::{
    CeremonyCookieFactory, CeremonyTicket, CookieOptions, SessionDecodeError,
    AUTHENTICATION_COOKIE, REGISTRATION_COOKIE,
};
