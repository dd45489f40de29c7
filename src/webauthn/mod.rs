//! `WebAuthn` implementation
//!
//! This module provides core `WebAuthn` functionality independent of any specific
//! application logic or session management: client data checks, authenticator
//! data parsing, COSE keys, attestation statements and assertion signatures.

pub mod attestation;
pub mod cbor;
pub mod client_data;
pub mod cose;
pub mod crypto;
mod errors;
mod service;
mod settings;
mod types;

// Re-exports for public use
pub use cose::{CoseAlgorithm, CoseKey};
pub use errors::WebAuthnError;
pub use service::{check_sign_count, WebAuthnService};
pub use settings::WebAuthnSettings;
pub use types::*;
