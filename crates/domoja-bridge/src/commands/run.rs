//! `run`: drive the bridge against an in-memory host until interrupted.
//!
//! The in-memory host has nothing to restore, so it reports ready at once.
//! Characteristic updates show up in the logs (`-v`).

use std::sync::Arc;

use tracing::{error, info};

use domoja_config::validate;
use domoja_core::{Bridge, MemoryHost, ServiceCatalog};

use crate::cli::GlobalOpts;
use crate::error::CliError;

use super::util;

pub async fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let config = util::load(global)?;
    let specs = config.accessory_specs()?;
    let catalog = ServiceCatalog::homekit();
    log_warnings(&validate(&specs, &catalog)?);

    let bridge_config = domoja_config::to_bridge_config(&config)?;
    let host = Arc::new(MemoryHost::new(catalog));
    let bridge = Bridge::connect(bridge_config, host, specs)?;
    let mut hangup = Hangup::new()?;

    bridge.host_ready().await?;
    let summary = tokio::select! {
        result = bridge.start() => result?,
        _ = tokio::signal::ctrl_c() => {
            bridge.shutdown().await;
            return Ok(());
        }
    };
    info!(
        created = summary.created,
        kept = summary.kept,
        skipped = summary.skipped,
        "bridge running, press Ctrl-C to stop"
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = hangup.recv() => reload(&bridge, global).await,
        }
    }

    info!("shutting down");
    bridge.shutdown().await;
    Ok(())
}

async fn reload(bridge: &Bridge, global: &GlobalOpts) {
    info!("reloading configuration");
    let specs = match util::load(global).and_then(|c| c.accessory_specs().map_err(CliError::from)) {
        Ok(specs) => specs,
        Err(e) => {
            error!(error = %e, "configuration reload failed, keeping current accessories");
            return;
        }
    };
    if let Ok(warnings) = validate(&specs, bridge.host().catalog()) {
        log_warnings(&warnings);
    }

    match bridge.apply_config(specs).await {
        Ok(Some(summary)) => info!(
            created = summary.created,
            updated = summary.updated,
            removed = summary.removed,
            "configuration reloaded"
        ),
        Ok(None) => {}
        Err(e) => error!(error = %e, "configuration reload refused"),
    }
}

fn log_warnings(warnings: &[domoja_config::ConfigWarning]) {
    for warning in warnings {
        tracing::warn!("{warning}");
    }
}

// ── Reload signal ────────────────────────────────────────────────────

#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> Result<Self, CliError> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    #[allow(clippy::unnecessary_wraps)]
    fn new() -> Result<Self, CliError> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}
