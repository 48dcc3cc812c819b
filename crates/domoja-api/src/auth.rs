// Session login
//
// Form-based login against `login.html`. A successful login is recognised
// by the presence of a `Set-Cookie` header, not by the status code: some
// deployments answer 200 without establishing a session.

use reqwest::header::SET_COOKIE;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::client::DomojaClient;
use crate::error::Error;
use crate::models::LoginOutcome;

impl DomojaClient {
    /// Authenticate with username/password.
    ///
    /// `POST /login.html` with a form-encoded body. Returns the normalized
    /// `Cookie` header value on success; the caller keeps it and passes it
    /// to every authenticated call.
    pub async fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<LoginOutcome, Error> {
        let url = self.url("login.html")?;
        debug!("logging in at {}", url);

        let resp = self
            .http()
            .post(url)
            .form(&[
                ("username", username),
                ("password", password.expose_secret()),
                ("remember_me", "true"),
            ])
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status().as_u16();
        let set_cookie = resp
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");

        // Drain the body so the exchange completes before the connection is reused.
        let _ = resp.text().await;

        let cookie = normalize_set_cookie(&set_cookie);
        if cookie.is_empty() {
            debug!(status, "login answered without a session cookie");
            return Ok(LoginOutcome::NoSession { status });
        }

        debug!("login successful");
        Ok(LoginOutcome::Session(cookie))
    }
}

/// Collapse a `Set-Cookie` header into a reusable `Cookie` header value.
///
/// Accepts several cookie groups joined by commas, each carrying
/// `name=value;` plus attributes (`Path`, `Expires`, `HttpOnly`, ...):
///
/// ```text
/// remember_me=Ywq; Max-Age=604800; Path=/; Expires=Mon, 11 Dec 2023 14:29:28 GMT; HttpOnly, connect.sid=s%3Ax; Path=/; HttpOnly
/// ```
///
/// and keeps only each group's leading pair, space-separated:
///
/// ```text
/// remember_me=Ywq; connect.sid=s%3Ax;
/// ```
///
/// Commas inside `Expires` dates do not start a new group.
pub fn normalize_set_cookie(header: &str) -> String {
    let mut groups: Vec<String> = Vec::new();

    for fragment in header.split(',') {
        match groups.last_mut() {
            Some(last) if !starts_cookie_group(fragment) => {
                last.push(',');
                last.push_str(fragment);
            }
            _ => groups.push(fragment.to_owned()),
        }
    }

    groups
        .iter()
        .filter_map(|group| {
            let pair = group.split(';').next()?.trim();
            let (name, _) = pair.split_once('=')?;
            (!name.trim().is_empty()).then(|| format!("{pair};"))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A fragment opens a new cookie group when its first segment is a
/// `name=value` pair whose name is a single token.
fn starts_cookie_group(fragment: &str) -> bool {
    let head = fragment.split(';').next().unwrap_or_default();
    head.split_once('=').is_some_and(|(name, _)| {
        let name = name.trim();
        !name.is_empty() && !name.contains(char::is_whitespace)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn normalizes_two_cookie_groups_with_expires_comma() {
        let header = "remember_me=YwqEFCBdzTkCdNHrwcv5XLMrm4mxlX3JlzipsUIhNxFAzvHNivgobjXOgzxFXH25; \
            Max-Age=604800; Path=/; Expires=Mon, 11 Dec 2023 14:29:28 GMT; HttpOnly, \
            connect.sid=s%3AxsjuwzBEeWp1Mq4daDKuxiDMKptgCobc.Iu2ABKTaMtPpNgdUuXKiXi%2FhlYXSfgGwgt4uFiso%2FdQ; \
            Path=/; HttpOnly";

        assert_eq!(
            normalize_set_cookie(header),
            "remember_me=YwqEFCBdzTkCdNHrwcv5XLMrm4mxlX3JlzipsUIhNxFAzvHNivgobjXOgzxFXH25; \
             connect.sid=s%3AxsjuwzBEeWp1Mq4daDKuxiDMKptgCobc.Iu2ABKTaMtPpNgdUuXKiXi%2FhlYXSfgGwgt4uFiso%2FdQ;"
        );
    }

    #[test]
    fn normalizes_single_cookie_without_attributes() {
        assert_eq!(normalize_set_cookie("sid=abc"), "sid=abc;");
    }

    #[test]
    fn empty_header_yields_empty_cookie() {
        assert_eq!(normalize_set_cookie(""), "");
        assert_eq!(normalize_set_cookie("   "), "");
    }

    #[test]
    fn separately_joined_headers_are_kept_apart() {
        let header = ["a=1; Path=/", "b=2; HttpOnly"].join(", ");
        assert_eq!(normalize_set_cookie(&header), "a=1; b=2;");
    }
}
