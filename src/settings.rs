use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::utils::crypto::random_bytes;
use crate::webauthn::{UserVerificationRequirement, WebAuthnSettings};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PassgateSettings {
    pub application: ApplicationSettings,
    pub relying_party: WebAuthnSettings,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Key material for sealing ceremony tickets; generated when empty
    pub session_secret: String,
    /// How long a begun ceremony may wait for its finish call
    pub challenge_ttl_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_secret: String::new(),
            challenge_ttl_seconds: 300,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PassgateSettings {
    /// Load settings from `.env`, `Settings.toml` files and the environment
    ///
    /// Also initializes the logger.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The logger is already initialized
    /// - A settings file cannot be read or parsed
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::initialize_environment()?;

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);

        Ok(settings)
    }

    /// Parse a single settings file without touching the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let toml_content = fs::read_to_string(path)?;
        Ok(basic_toml::from_str(&toml_content)?)
    }

    /// # Errors
    ///
    /// Returns an error if logger initialization fails
    fn initialize_environment() -> Result<(), Box<dyn std::error::Error>> {
        Self::load_env_file();
        env_logger::try_init()?;
        Ok(())
    }

    /// Settings priority, highest first:
    /// 1. Environment variables (applied after this returns)
    /// 2. Settings.toml in `PASSGATE_SECRETS_DIR`
    /// 3. Settings.toml in the working directory
    /// 4. Defaults
    fn load_base_settings() -> Result<Self, Box<dyn std::error::Error>> {
        let mut settings = Self::default();

        let default_config_path = Path::new("Settings.toml");
        if default_config_path.exists() {
            settings = Self::load_from_file(default_config_path)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("PASSGATE_SECRETS_DIR") {
            let secrets_path = Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::load_from_file(&secrets_path)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ PASSGATE_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Apply environment variable overrides to settings
    pub fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_relying_party_env_overrides(&mut settings.relying_party);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_cookie_env_overrides(&mut settings.cookies);
        Self::apply_logging_env_overrides(&mut settings.logging);
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(cors_origins) = std::env::var("CORS_ORIGINS") {
            app_settings.cors_origins = cors_origins;
        }
    }

    fn apply_relying_party_env_overrides(rp_settings: &mut WebAuthnSettings) {
        if let Ok(rp_id) = std::env::var("RP_ID") {
            rp_settings.rp_id = rp_id;
        }
        if let Ok(rp_name) = std::env::var("RP_NAME") {
            rp_settings.rp_name = rp_name;
        }
        if let Ok(rp_origin) = std::env::var("RP_ORIGIN") {
            rp_settings.rp_origin = rp_origin;
        }
        if let Ok(requirement) = std::env::var("USER_VERIFICATION") {
            match Self::parse_user_verification(&requirement) {
                Some(value) => rp_settings.user_verification = value,
                None => log::warn!("Ignoring unknown USER_VERIFICATION value: {requirement}"),
            }
        }
    }

    fn parse_user_verification(value: &str) -> Option<UserVerificationRequirement> {
        match value.trim().to_ascii_lowercase().as_str() {
            "required" => Some(UserVerificationRequirement::Required),
            "preferred" => Some(UserVerificationRequirement::Preferred),
            "discouraged" => Some(UserVerificationRequirement::Discouraged),
            _ => None,
        }
    }

    /// Apply environment overrides for session settings
    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        Self::apply_numeric_env_override(
            "CHALLENGE_TTL_SECONDS",
            &mut session_settings.challenge_ttl_seconds,
        );
        Self::handle_session_secret_override(session_settings);
    }

    fn apply_numeric_env_override(env_var: &str, target: &mut u64) {
        if let Ok(value_str) = std::env::var(env_var) {
            if let Ok(value) = value_str.parse::<u64>() {
                *target = value;
            }
        }
    }

    fn handle_session_secret_override(session_settings: &mut SessionSettings) {
        let env_secret_set = std::env::var("SESSION_SECRET").is_ok_and(|secret| {
            if secret.is_empty() {
                false
            } else {
                session_settings.session_secret = secret;
                true
            }
        });

        if !env_secret_set && session_settings.session_secret.is_empty() {
            session_settings.session_secret = Self::generate_random_session_secret();
            Self::warn_about_generated_secret();
        }
    }

    /// 32 random bytes, base64 encoded
    fn generate_random_session_secret() -> String {
        general_purpose::STANDARD.encode(random_bytes(32))
    }

    fn warn_about_generated_secret() {
        log::warn!("Using auto-generated session secret");
        log::warn!("Set SESSION_SECRET or session.session_secret in Settings.toml for production use");
        log::warn!("Pending ceremonies will not survive a restart");
    }

    fn apply_cookie_env_overrides(cookie_settings: &mut CookieSettings) {
        if let Ok(cookie_secure_str) = std::env::var("COOKIE_SECURE") {
            if let Ok(cookie_secure) = cookie_secure_str.parse::<bool>() {
                cookie_settings.secure = cookie_secure;
            }
        }
    }

    fn apply_logging_env_overrides(logging_settings: &mut LoggingSettings) {
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            logging_settings.level = log_level;
        }
    }

    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Get CORS origins as a vector of strings
    #[must_use]
    pub fn get_cors_origins(&self) -> Vec<String> {
        self.application
            .cors_origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Challenge TTL as a signed duration, saturating at chrono's limit
    #[must_use]
    pub fn challenge_ttl(&self) -> chrono::Duration {
        let seconds = i64::try_from(self.session.challenge_ttl_seconds)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        chrono::Duration::seconds(seconds)
    }

    /// Challenge TTL in whole seconds for cookie `Max-Age`
    #[must_use]
    pub fn challenge_ttl_seconds(&self) -> i64 {
        self.challenge_ttl().num_seconds()
    }
}
