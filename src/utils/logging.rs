// Centralized logging for ceremony outcomes and security events
use log::{error, info, warn};

use crate::passkey::PasskeyError;

/// Log target for security audit records
pub const AUDIT_TARGET: &str = "passgate::audit";

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log a completed ceremony
    pub fn log_ceremony_success(ceremony: &str, user_name: &str, credential_id: &str) {
        info!("✅ {ceremony} succeeded for {user_name} (credential {credential_id})");
    }

    /// Log a failed ceremony at a level matching its severity
    ///
    /// Counter regressions go to the audit target at `error`; failed
    /// cryptographic checks are `warn`; everything else is `info`.
    pub fn log_ceremony_failure(ceremony: &str, user_name: &str, err: &PasskeyError) {
        match err {
            PasskeyError::CounterRegression { stored, received } => {
                error!(
                    target: AUDIT_TARGET,
                    "Possible cloned authenticator for {user_name}: signature counter {received} <= stored {stored}"
                );
            }
            _ if err.is_security_relevant() => {
                warn!("🔒 {ceremony} rejected for {user_name}: {err}");
            }
            _ => {
                info!("❌ {ceremony} failed for {user_name}: {err}");
            }
        }
    }

    /// Log a new user record
    pub fn log_user_created(user_name: &str) {
        info!("👤 Created user record for {user_name}");
    }

    /// Log effective relying party configuration at startup
    pub fn log_relying_party(rp_id: &str, rp_origin: &str, algorithms: &[i64]) {
        info!("🔧 Relying party {rp_id} at {rp_origin}, algorithms {algorithms:?}");
    }
}
