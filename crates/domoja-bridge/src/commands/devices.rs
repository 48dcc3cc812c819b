//! `devices`: one-shot login and inventory listing.

use std::sync::Arc;

use serde::Serialize;
use tabled::Tabled;

use domoja_core::device::format_timestamp;
use domoja_core::{CoreError, Device, DeviceCache, DomojaClient, LoginPolicy, SessionManager};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Views ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeviceView {
    path: String,
    name: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    state: serde_json::Value,
    last_update_date: Option<String>,
    tags: Vec<String>,
}

impl From<&Arc<Device>> for DeviceView {
    fn from(d: &Arc<Device>) -> Self {
        Self {
            path: d.path.clone(),
            name: d.name.clone(),
            kind: d.kind.clone(),
            state: d.state_json(),
            last_update_date: d.last_update.as_ref().map(format_timestamp),
            tags: d.tags().into_iter().map(str::to_owned).collect(),
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Last update")]
    last_update: String,
}

impl From<&DeviceView> for DeviceRow {
    fn from(d: &DeviceView) -> Self {
        Self {
            path: d.path.clone(),
            name: d.name.clone().unwrap_or_default(),
            kind: d.kind.clone().unwrap_or_default(),
            state: domoja_core::mapping::display_value(&d.state),
            last_update: d.last_update_date.clone().unwrap_or_else(|| "-".into()),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: &DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let config = util::load(global)?;
    let bridge = domoja_config::to_bridge_config(&config)?;

    let client = DomojaClient::new(bridge.url.clone(), &bridge.transport()).map_err(CoreError::from)?;
    let session = SessionManager::new(bridge.username.clone(), bridge.password.clone());
    // One attempt: a listing should fail fast instead of retrying forever.
    let policy = LoginPolicy {
        max_attempts: Some(1),
        ..bridge.login.clone()
    };
    session.login(&client, &policy).await?;

    let cache = DeviceCache::new();
    cache.load(&client, &session.cookie()).await?;

    let devices: Vec<DeviceView> = cache
        .snapshot()
        .iter()
        .filter(|d| args.prefix.as_deref().is_none_or(|p| d.path.starts_with(p)))
        .filter(|d| args.tag.as_deref().is_none_or(|t| d.tags().contains(&t)))
        .map(DeviceView::from)
        .collect();

    let out = output::render_list(&global.output, &devices, |d| DeviceRow::from(d), |d| d.path.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
