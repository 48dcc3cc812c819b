// Domoja HTTP client
//
// Wraps `reqwest::Client` with Domoja-specific URL construction and
// response classification. Endpoint groups (auth, devices) are
// implemented as inherent methods in separate files to keep this module
// focused on transport mechanics.

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Raw HTTP client for the Domoja server.
///
/// The session is carried explicitly: every authenticated call takes the
/// `Cookie` header value produced by [`login`](Self::login). The client
/// itself holds no session state, so the caller owns re-login policy.
#[derive(Debug, Clone)]
pub struct DomojaClient {
    http: reqwest::Client,
    base_url: Url,
}

impl DomojaClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the server root, e.g. `https://domoja.local:4001`.
    pub fn new(base_url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, base_url })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The server base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build a full URL for a server path, tolerating a base URL with or
    /// without a trailing slash.
    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let full = format!("{base}/{}", path.trim_start_matches('/'));
        debug!(url = %full, "built request URL");
        Ok(Url::parse(&full)?)
    }

    /// `url(base)` with `segment` appended as one escaped path segment.
    pub(crate) fn segment_url(&self, base: &str, segment: &str) -> Result<Url, Error> {
        let mut url = self.url(base)?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(segment);
        Ok(url)
    }
}
