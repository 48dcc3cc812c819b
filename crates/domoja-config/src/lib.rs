//! Configuration for the Domoja bridge.
//!
//! A JSON or TOML file (the platform block of a Homebridge-style
//! `config.json` loads as-is), `DOMOJA_` environment overrides, credential
//! resolution (env + keyring + plaintext), and translation into
//! `domoja_core::BridgeConfig` plus the normalized accessory specs.

pub mod accessories;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use domoja_core::{
    AccessorySpec, BridgeConfig, IdentityPolicy, LoginPolicy, PushConfig, TlsVerification,
};

pub use accessories::{AccessoryEntry, ConfigWarning, normalize, validate};

/// Keyring service under which passwords are stored, keyed by username.
pub const KEYRING_SERVICE: &str = "domoja-bridge";

/// Environment variable consulted first for the password.
pub const PASSWORD_ENV: &str = "DOMOJA_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Duplicate accessory \"{name}\" found in configuration")]
    DuplicateDisplayName { name: String },

    #[error("no password configured for user '{username}'")]
    NoCredentials { username: String },

    #[error("config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("unsupported config format '{extension}' (expected .json or .toml)")]
    UnsupportedFormat { extension: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── File structs ────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Homebridge platform name; accepted and ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Device server root, e.g. `http://domoja.local:4001`.
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub auth: Auth,

    /// Skip TLS verification (self-signed servers).
    #[serde(default)]
    pub insecure: bool,

    /// Path to a custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    /// Per-request HTTP timeout.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub login: LoginSettings,

    #[serde(default)]
    pub push: PushSettings,

    #[serde(default)]
    pub identity: IdentityPolicy,

    #[serde(default)]
    pub accessories: Vec<AccessoryEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            platform: None,
            url: String::new(),
            auth: Auth::default(),
            insecure: false,
            ca_cert: None,
            timeout_secs: default_timeout(),
            login: LoginSettings::default(),
            push: PushSettings::default(),
            identity: IdentityPolicy::default(),
            accessories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Auth {
    #[serde(default)]
    pub username: String,

    /// Plaintext password; prefer the keyring or `DOMOJA_PASSWORD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSettings {
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_max_logged_retries")]
    pub max_logged_retries: u32,

    /// Give up the startup login after this long. Unset retries forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            retry_delay_secs: default_retry_delay(),
            max_logged_retries: default_max_logged_retries(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSettings {
    #[serde(default = "default_retry_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: default_retry_delay(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_retry_delay() -> u64 {
    10
}
fn default_max_logged_retries() -> u32 {
    2
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the default config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "domoja", "domoja-bridge").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.json");
            p
        },
        |dirs| dirs.config_dir().join("config.json"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("domoja-bridge");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from `path` + environment.
///
/// The format follows the extension: `.toml` is TOML, anything else JSON.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let figment = Figment::new().merge(Serialized::defaults(Config::default()));
    let figment = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("json") | None => figment.merge(Json::file(path)),
        Some(other) => {
            return Err(ConfigError::UnsupportedFormat {
                extension: other.to_owned(),
            });
        }
    };

    let config: Config = figment
        .merge(Env::prefixed("DOMOJA_").split("_"))
        .extract()?;
    debug!(path = %path.display(), accessories = config.accessories.len(), "configuration loaded");
    Ok(config)
}

impl Config {
    /// Normalized accessory specs, in file order.
    pub fn accessory_specs(&self) -> Result<Vec<AccessorySpec>, ConfigError> {
        normalize(&self.accessories)
    }
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the password: `DOMOJA_PASSWORD`, then the system keyring, then
/// the plaintext `auth.password`.
pub fn resolve_password(auth: &Auth) -> Result<SecretString, ConfigError> {
    // 1. Env var
    if let Ok(pw) = std::env::var(PASSWORD_ENV) {
        return Ok(SecretString::from(pw));
    }

    // 2. Keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &auth.username) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = auth.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        username: auth.username.clone(),
    })
}

/// Build a `BridgeConfig` from the file settings.
pub fn to_bridge_config(config: &Config) -> Result<BridgeConfig, ConfigError> {
    let url: url::Url = config.url.parse().map_err(|_| ConfigError::Validation {
        field: "url".into(),
        reason: format!("invalid URL: '{}'", config.url),
    })?;

    if config.auth.username.is_empty() {
        return Err(ConfigError::Validation {
            field: "auth.username".into(),
            reason: "must not be empty".into(),
        });
    }
    let password = resolve_password(&config.auth)?;

    let tls = if config.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = config.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let mut bridge = BridgeConfig::new(url, config.auth.username.clone(), password);
    bridge.tls = tls;
    bridge.timeout = Duration::from_secs(config.timeout_secs);
    bridge.login = LoginPolicy {
        retry_delay: Duration::from_secs(config.login.retry_delay_secs),
        max_logged_retries: config.login.max_logged_retries,
        timeout: config.login.timeout_secs.map(Duration::from_secs),
        max_attempts: None,
    };
    bridge.push = PushConfig {
        reconnect_delay: Duration::from_secs(config.push.reconnect_delay_secs),
        ..PushConfig::default()
    };
    bridge.identity = config.identity;
    Ok(bridge)
}
