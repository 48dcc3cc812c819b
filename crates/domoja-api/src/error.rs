use thiserror::Error;

/// Top-level error type for the `domoja-api` crate.
///
/// Covers every failure mode of the HTTP surface and the push channel.
/// `domoja-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The server answered 401: the session cookie is missing or stale.
    #[error("Unauthorized -- re-authentication required")]
    Unauthorized,

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Device API ──────────────────────────────────────────────────
    /// The device inventory request returned an empty or `null` body.
    #[error("Device inventory is empty (HTTP {status})")]
    EmptyInventory { status: u16 },

    /// Non-success HTTP status on a read endpoint.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A device command did not answer with the success marker.
    #[error("Command rejected (HTTP {status}): {body}")]
    CommandRejected { status: u16, body: String },

    // ── Push channel ────────────────────────────────────────────────
    /// The push channel could not be established.
    #[error("Push channel connection failed: {0}")]
    PushConnect(String),

    /// The push channel broke after it was established.
    #[error("Push channel dropped: {0}")]
    PushDropped(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates auth has expired
    /// and re-authentication might resolve it.
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::Unauthorized => true,
            Self::CommandRejected { status, .. } | Self::Http { status, .. } => *status == 401,
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::UNAUTHORIZED),
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::EmptyInventory { .. } | Self::PushConnect(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_auth_expired() {
        assert!(Error::Unauthorized.is_auth_expired());
        assert!(
            Error::CommandRejected {
                status: 401,
                body: String::new()
            }
            .is_auth_expired()
        );
        assert!(
            !Error::CommandRejected {
                status: 500,
                body: "boom".into()
            }
            .is_auth_expired()
        );
    }

    #[test]
    fn empty_inventory_is_transient() {
        assert!(Error::EmptyInventory { status: 200 }.is_transient());
        assert!(!Error::Unauthorized.is_transient());
    }
}
