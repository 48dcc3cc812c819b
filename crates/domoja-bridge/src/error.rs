//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use domoja_config::ConfigError;
use domoja_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to domoja server")]
    #[diagnostic(
        code(domoja::connection_failed),
        help(
            "Check that the server is running and that `url` in the configuration is right.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Timed out logging in to domoja server after {attempts} attempt(s)")]
    #[diagnostic(
        code(domoja::timeout),
        help("Raise `login.timeoutSecs` or check server responsiveness.")
    )]
    Timeout { attempts: u32 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(domoja::auth_failed),
        help("Verify `auth.username` and the password for that user.")
    )]
    AuthFailed { message: String },

    #[error("No password configured for user '{username}'")]
    #[diagnostic(
        code(domoja::no_credentials),
        help(
            "Set DOMOJA_PASSWORD, store it in the system keyring under service \
             'domoja-bridge', or add `auth.password` to the configuration."
        )
    )]
    NoCredentials { username: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(code(domoja::not_found))]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    // ── Server ───────────────────────────────────────────────────────
    #[error("Domoja error: {message}")]
    #[diagnostic(code(domoja::api_error))]
    ApiError { message: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file not found")]
    #[diagnostic(
        code(domoja::no_config),
        help(
            "Pass one with --config, or create it at the default location.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(domoja::invalid_config))]
    InvalidConfig { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not render output: {message}")]
    #[diagnostic(code(domoja::output))]
    Output { message: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::InvalidConfig { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Output {
            message: err.to_string(),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },

            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },

            CoreError::LoginTimeout { attempts } => CliError::Timeout { attempts },

            CoreError::LoginAttemptsExhausted { attempts } => CliError::AuthFailed {
                message: format!("gave up after {attempts} attempt(s)"),
            },

            CoreError::DeviceNotFound { path } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: path,
            },

            CoreError::AccessoryNotFound { handle } => CliError::NotFound {
                resource_type: "accessory".into(),
                identifier: handle.to_string(),
            },

            CoreError::DuplicateDisplayName { .. } | CoreError::Config { .. } => {
                CliError::InvalidConfig {
                    message: err.to_string(),
                }
            }

            other => CliError::ApiError {
                message: other.to_string(),
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound { path } => CliError::NoConfig {
                path: path.display().to_string(),
            },
            ConfigError::NoCredentials { username } => CliError::NoCredentials { username },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::InvalidConfig {
                message: other.to_string(),
            },
        }
    }
}
