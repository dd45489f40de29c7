//! Testing utilities for passgate
//!
//! Available to unit tests and, with the `testing` feature, to the
//! integration tests under `tests/`.
//!
//! - [`authenticator`] - Software authenticator producing real signatures
//! - [`fixtures`] - Pre-built services, credentials and constants
//!
//! ```rust,ignore
//! use passgate::testing::{fixtures, SoftAuthenticator};
//!
//! let service = fixtures::test_passkey_service();
//! let mut authenticator = SoftAuthenticator::new(fixtures::TEST_RP_ID, fixtures::TEST_ORIGIN);
//! let start = service.begin_registration("alice@example.com").unwrap();
//! let response = authenticator.create(&start.options);
//! service
//!     .finish_registration("alice@example.com", &start.token, &response)
//!     .unwrap();
//! ```

pub mod authenticator;
pub mod fixtures;

pub use authenticator::{AttestationMode, SoftAuthenticator};
