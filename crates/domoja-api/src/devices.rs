// Device endpoints
//
// Inventory read (`GET /devices`) and state commands
// (`POST /devices/<path>`). Both carry the session cookie explicitly.

use reqwest::StatusCode;
use reqwest::header::COOKIE;
use tracing::debug;

use crate::client::DomojaClient;
use crate::error::Error;
use crate::models::DeviceRecord;

/// Literal body the server answers when a command was applied.
pub const COMMAND_SUCCESS_MARKER: &str = "OK";

impl DomojaClient {
    /// Fetch the full device inventory.
    ///
    /// `GET /devices`. A `null` body is reported as
    /// [`Error::EmptyInventory`] so the caller can retry the whole
    /// startup sequence.
    pub async fn list_devices(&self, cookie: &str) -> Result<Vec<DeviceRecord>, Error> {
        let url = self.url("devices")?;
        debug!("listing devices");

        let resp = self
            .http()
            .get(url)
            .header(COOKIE, cookie)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }

        let body = resp.text().await.map_err(Error::Transport)?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        if body.trim().is_empty() {
            return Err(Error::EmptyInventory {
                status: status.as_u16(),
            });
        }

        let devices: Option<Vec<DeviceRecord>> =
            serde_json::from_str(&body).map_err(|e| {
                let preview: String = body.chars().take(200).collect();
                Error::Deserialization {
                    message: format!("{e} (body preview: {preview:?})"),
                    body: body.clone(),
                }
            })?;

        devices.ok_or(Error::EmptyInventory {
            status: status.as_u16(),
        })
    }

    /// Send a state command to one device.
    ///
    /// `POST /devices/<path>` with form body `command=<value>`. The server
    /// answers the literal [`COMMAND_SUCCESS_MARKER`] on success.
    pub async fn send_command(&self, cookie: &str, path: &str, command: &str) -> Result<(), Error> {
        let url = self.segment_url("devices", path)?;
        debug!(device = path, command, "sending device command");

        let resp = self
            .http()
            .post(url)
            .header(COOKIE, cookie)
            .form(&[("command", command)])
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;

        if body == COMMAND_SUCCESS_MARKER {
            return Ok(());
        }

        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::Unauthorized);
        }

        Err(Error::CommandRejected {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        })
    }
}
