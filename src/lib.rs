#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the passgate application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod passkey;
pub mod session;
pub mod settings;
pub mod utils;
pub mod validation;
pub mod webauthn;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use handlers::{configure_services, health};
pub use passkey::{PasskeyError, PasskeyService};
pub use session::CeremonyCookieFactory;
pub use settings::PassgateSettings;
pub use webauthn::{WebAuthnError, WebAuthnService, WebAuthnSettings};
