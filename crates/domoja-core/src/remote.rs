// ── Remote server seam ──
//
// The three HTTP calls the engine makes, behind a trait so session,
// cache and command logic can run against a scripted server in tests.

use std::future::Future;

use secrecy::SecretString;
use url::Url;

use domoja_api::{DeviceRecord, DomojaClient, Error, LoginOutcome};

/// Request/response surface of the device server.
pub trait RemoteServer: Send + Sync + 'static {
    /// Server root; the push channel endpoint is derived from it.
    fn base_url(&self) -> &Url;

    fn login(
        &self,
        username: &str,
        password: &SecretString,
    ) -> impl Future<Output = Result<LoginOutcome, Error>> + Send;

    fn list_devices(&self, cookie: &str) -> impl Future<Output = Result<Vec<DeviceRecord>, Error>> + Send;

    fn send_command(
        &self,
        cookie: &str,
        path: &str,
        command: &str,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}

impl RemoteServer for DomojaClient {
    fn base_url(&self) -> &Url {
        DomojaClient::base_url(self)
    }

    async fn login(&self, username: &str, password: &SecretString) -> Result<LoginOutcome, Error> {
        DomojaClient::login(self, username, password).await
    }

    async fn list_devices(&self, cookie: &str) -> Result<Vec<DeviceRecord>, Error> {
        DomojaClient::list_devices(self, cookie).await
    }

    async fn send_command(&self, cookie: &str, path: &str, command: &str) -> Result<(), Error> {
        DomojaClient::send_command(self, cookie, path, command).await
    }
}
