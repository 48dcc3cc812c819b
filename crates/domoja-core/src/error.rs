// ── Core error types ──
//
// Errors surfaced by the engine. Transport failures from `domoja-api` are
// folded into domain variants by the `From` impl below, keeping the
// auth/transient classification callers need for retry decisions.

use thiserror::Error;

use crate::host::{AccessoryHandle, HostError};

#[derive(Debug, Error)]
pub enum CoreError {
    // ── Session ──────────────────────────────────────────────────────
    #[error("Cannot connect to domoja server: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Timeout while trying to connect to domoja server after {attempts} attempt(s)")]
    LoginTimeout { attempts: u32 },

    #[error("Could not log in to domoja server after {attempts} attempt(s)")]
    LoginAttemptsExhausted { attempts: u32 },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device inventory unavailable: {message}")]
    InventoryUnavailable { message: String },

    #[error("Device not found: {path}")]
    DeviceNotFound { path: String },

    #[error("Device {device} rejected command (HTTP {status}): {body}")]
    CommandRejected {
        device: String,
        status: u16,
        body: String,
    },

    // ── Accessories ──────────────────────────────────────────────────
    #[error("Duplicate accessory \"{name}\" found in configuration")]
    DuplicateDisplayName { name: String },

    #[error("Accessory not found: {handle}")]
    AccessoryNotFound { handle: AccessoryHandle },

    #[error("{accessory}.{service}.{characteristic} has no set binding")]
    NotSettable {
        accessory: String,
        service: String,
        characteristic: String,
    },

    #[error(transparent)]
    Host(#[from] HostError),

    // ── Wrapped API errors ───────────────────────────────────────────
    #[error("Domoja API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
        auth_expired: bool,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Bridge is shutting down")]
    Shutdown,
}

impl CoreError {
    /// The server refused the session; a fresh login may fix it.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::AuthenticationFailed { .. } => true,
            Self::CommandRejected { status, .. } => *status == 401,
            Self::Api { auth_expired, .. } => *auth_expired,
            _ => false,
        }
    }

    /// Worth retrying after a delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::InventoryUnavailable { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<domoja_api::Error> for CoreError {
    fn from(err: domoja_api::Error) -> Self {
        match err {
            domoja_api::Error::Unauthorized => CoreError::AuthenticationFailed {
                message: "session expired -- re-authentication required".into(),
            },
            domoja_api::Error::Transport(ref e) if e.is_connect() || e.is_timeout() => {
                CoreError::ConnectionFailed {
                    reason: e.to_string(),
                }
            }
            domoja_api::Error::Transport(ref e) => CoreError::Api {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
                auth_expired: err.is_auth_expired(),
            },
            domoja_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            domoja_api::Error::Tls(reason) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {reason}"),
            },
            domoja_api::Error::EmptyInventory { status } => CoreError::InventoryUnavailable {
                message: format!("empty device list (HTTP {status})"),
            },
            domoja_api::Error::Http { status, body } => CoreError::Api {
                message: body,
                status: Some(status),
                auth_expired: status == 401,
            },
            domoja_api::Error::CommandRejected { status, body } => CoreError::Api {
                message: format!("command rejected: {body}"),
                status: Some(status),
                auth_expired: status == 401,
            },
            domoja_api::Error::PushConnect(reason) | domoja_api::Error::PushDropped(reason) => {
                CoreError::ConnectionFailed { reason }
            }
            domoja_api::Error::Deserialization { message, body: _ } => {
                CoreError::InventoryUnavailable { message }
            }
        }
    }
}
