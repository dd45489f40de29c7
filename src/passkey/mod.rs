//! Passkey registration and login
//!
//! This module connects the `WebAuthn` ceremony core to user storage and
//! pending-ceremony tracking.

pub mod challenge;
mod errors;
mod service;
pub mod store;
mod types;

pub use challenge::{CeremonyKind, CeremonyState, ChallengeError, ChallengeManager, ChallengeSession};
pub use errors::{ErrorKind, PasskeyError};
pub use service::{AuthenticationStart, PasskeyService, RegistrationStart};
pub use store::{CredentialStore, MemoryCredentialStore, StoreError};
pub use types::User;
