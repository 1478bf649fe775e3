//! Secret storage in the OS keychain.
//!
//! At startup, [`populate_env_from_keychain`] copies stored secrets into
//! the environment when the variable is absent, so
//! [`crate::config::fetch_config`] sees them like any other setting.

use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Keychain service name used for all stored secrets.
const SERVICE: &str = "candle-desk";

/// Secrets that may live in the keychain instead of the environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKey {
    AccessToken,
    ClientSecret,
    ApiKey,
    TelegramBotToken,
}

impl CredentialKey {
    /// Keychain entry identifier.
    pub fn keyring_id(self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::ClientSecret => "client_secret",
            Self::ApiKey => "api_key",
            Self::TelegramBotToken => "telegram_bot_token",
        }
    }

    /// Environment variable the secret is exported as.
    pub fn env_var(self) -> &'static str {
        match self {
            Self::AccessToken => "ACCESS_TOKEN",
            Self::ClientSecret => "CLIENT_SECRET",
            Self::ApiKey => "API_KEY",
            Self::TelegramBotToken => "TELEGRAM_BOT_TOKEN",
        }
    }

    pub const ALL: [CredentialKey; 4] = [
        Self::AccessToken,
        Self::ClientSecret,
        Self::ApiKey,
        Self::TelegramBotToken,
    ];
}

/// Loads a secret from the keychain, returning `None` if not set.
pub fn load(key: CredentialKey) -> Option<Zeroizing<String>> {
    let entry = keyring::Entry::new(SERVICE, key.keyring_id()).ok()?;
    match entry.get_password() {
        Ok(password) => Some(Zeroizing::new(password)),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key = key.keyring_id(), error = %e, "failed to read keychain entry");
            None
        }
    }
}

/// Copies keychain secrets into environment variables that are unset or
/// empty.
///
/// Call this before the async runtime starts any other thread.
pub fn populate_env_from_keychain() {
    for key in CredentialKey::ALL {
        let present = std::env::var(key.env_var()).is_ok_and(|v| !v.trim().is_empty());
        if !present && let Some(value) = load(key) {
            debug!(key = key.env_var(), "loaded credential from keychain");
            // SAFETY: called at startup before other threads read the environment.
            unsafe {
                std::env::set_var(key.env_var(), value.as_str());
            }
        }
    }
}
