// ── Runtime bridge configuration ──
//
// How to reach the device server and how hard to retry. Carries
// credentials but never touches disk: `domoja-config` builds it from the
// configuration file and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use domoja_api::{PushConfig, TlsMode, TransportConfig};

use crate::identity::IdentityPolicy;
use crate::session::LoginPolicy;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store.
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed home servers).
    DangerAcceptInvalid,
}

/// Everything the bridge needs to run against one device server.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Server root, e.g. `http://domoja.local:4001`.
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Startup login policy. Its retry delay also paces device-load retries.
    pub login: LoginPolicy,
    pub push: PushConfig,
    pub identity: IdentityPolicy,
}

impl BridgeConfig {
    pub fn new(url: Url, username: impl Into<String>, password: SecretString) -> Self {
        Self {
            url,
            username: username.into(),
            password,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            login: LoginPolicy::default(),
            push: PushConfig::default(),
            identity: IdentityPolicy::default(),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }
}
