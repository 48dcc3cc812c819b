// ── Bridge ──
//
// Lifecycle of the engine against one device server: login → inventory
// load → reconciliation → live sync, plus the entry points the host calls
// (config reload, restored accessories, set requests, host-ready).

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use domoja_api::{ChangeEvent, DomojaClient, PushControl, PushEvent, PushHandle};

use crate::cache::DeviceCache;
use crate::command::{CommandOutcome, set_device_value};
use crate::config::BridgeConfig;
use crate::error::CoreError;
use crate::host::{Accessory, AccessoryHandle, HostAccessoryRegistry, MemoryHost};
use crate::reconcile::{ReconcileSummary, check_unique_display_names, reconcile};
use crate::remote::RemoteServer;
use crate::session::SessionManager;
use crate::spec::AccessorySpec;
use crate::summary::log_summary;
use crate::sync::{StartGate, fan_out};

/// The main entry point for hosts.
///
/// Cheaply cloneable via `Arc<BridgeInner>`. Does nothing until
/// [`start()`](Self::start) is called.
pub struct Bridge<R: RemoteServer = DomojaClient, H: HostAccessoryRegistry = MemoryHost> {
    inner: Arc<BridgeInner<R, H>>,
}

impl<R: RemoteServer, H: HostAccessoryRegistry> Clone for Bridge<R, H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BridgeInner<R, H> {
    config: BridgeConfig,
    remote: R,
    host: Arc<H>,
    session: SessionManager,
    cache: DeviceCache,
    specs: Mutex<Vec<AccessorySpec>>,
    accessories: Mutex<Vec<Accessory>>,
    gate: StartGate,
    cancel: CancellationToken,
    push: Mutex<Option<PushControl>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<H: HostAccessoryRegistry> Bridge<DomojaClient, H> {
    /// Build a bridge talking HTTP to `config.url`.
    pub fn connect(config: BridgeConfig, host: Arc<H>, specs: Vec<AccessorySpec>) -> Result<Self, CoreError> {
        let client = DomojaClient::new(config.url.clone(), &config.transport())?;
        Ok(Self::new(config, client, host, specs))
    }
}

impl<R: RemoteServer, H: HostAccessoryRegistry> Bridge<R, H> {
    pub fn new(config: BridgeConfig, remote: R, host: Arc<H>, specs: Vec<AccessorySpec>) -> Self {
        let session = SessionManager::new(config.username.clone(), config.password.clone());
        Self {
            inner: Arc::new(BridgeInner {
                config,
                remote,
                host,
                session,
                cache: DeviceCache::new(),
                specs: Mutex::new(specs),
                accessories: Mutex::new(Vec::new()),
                gate: StartGate::new(),
                cancel: CancellationToken::new(),
                push: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionManager {
        &self.inner.session
    }

    pub fn cache(&self) -> &DeviceCache {
        &self.inner.cache
    }

    pub fn host(&self) -> &Arc<H> {
        &self.inner.host
    }

    /// Snapshot of the current accessory set.
    pub async fn accessories(&self) -> Vec<Accessory> {
        self.inner.accessories.lock().await.clone()
    }

    /// `true` once the live sync has been started.
    pub fn is_live(&self) -> bool {
        self.inner.gate.is_open()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Log in, load the device inventory and reconcile accessories.
    ///
    /// Login and load are retried as a pair until the inventory arrives,
    /// unless the login policy times out. Live sync starts here when the
    /// host is already ready.
    pub async fn start(&self) -> Result<ReconcileSummary, CoreError> {
        self.load_inventory().await?;
        let summary = self.reconcile_current().await?;

        if self.inner.gate.mark_inventory_loaded() {
            self.open_push().await?;
        }
        Ok(summary)
    }

    /// Signal that the host finished restoring accessories.
    pub async fn host_ready(&self) -> Result<(), CoreError> {
        info!("host finished launching");
        if self.inner.gate.mark_host_ready() {
            self.open_push().await?;
        }
        Ok(())
    }

    /// Cancel background tasks and wait for them.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        *self.inner.push.lock().await = None;
        debug!("bridge shut down");
    }

    async fn load_inventory(&self) -> Result<(), CoreError> {
        let inner = &self.inner;
        let delay = inner.config.login.retry_delay;

        loop {
            tokio::select! {
                biased;
                () = inner.cancel.cancelled() => return Err(CoreError::Shutdown),
                result = inner.session.login(&inner.remote, &inner.config.login) => result?,
            }

            match inner.cache.load(&inner.remote, &inner.session.cookie()).await {
                Ok(_) => return Ok(()),
                Err(e) => {
                    if e.is_auth_expired() {
                        inner.session.invalidate();
                    }
                    warn!("Could not retrieve devices from Domoja. Retrying in {}s...", delay.as_secs());
                }
            }

            tokio::select! {
                biased;
                () = inner.cancel.cancelled() => return Err(CoreError::Shutdown),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    // ── Configuration ────────────────────────────────────────────────

    /// Replace the desired accessory set and reconcile against it.
    ///
    /// Returns `None` when the inventory has not been loaded yet; the specs
    /// are kept and reconciled by [`start()`](Self::start).
    pub async fn apply_config(&self, specs: Vec<AccessorySpec>) -> Result<Option<ReconcileSummary>, CoreError> {
        check_unique_display_names(&specs)?;
        *self.inner.specs.lock().await = specs;

        if !self.inner.cache.is_loaded() {
            debug!("device inventory not loaded yet, reconciliation deferred");
            return Ok(None);
        }
        self.reconcile_current().await.map(Some)
    }

    /// Adopt an accessory the host restored from its own persistence.
    ///
    /// It takes part in the next reconciliation like any other accessory,
    /// and set requests for it are routed as soon as this returns.
    pub async fn configure_restored(&self, accessory: Accessory) {
        info!(accessory = accessory.display_name(), "loading accessory from cache");
        let mut accessories = self.inner.accessories.lock().await;
        accessories.retain(|a| a.handle != accessory.handle);
        accessories.push(accessory);
    }

    async fn reconcile_current(&self) -> Result<ReconcileSummary, CoreError> {
        let specs = self.inner.specs.lock().await.clone();
        let mut accessories = self.inner.accessories.lock().await;

        let outcome = reconcile(
            &*self.inner.host,
            &self.inner.cache,
            self.inner.config.identity,
            &specs,
            accessories.clone(),
        )?;

        *accessories = outcome.accessories;
        log_summary(accessories.iter().map(|a| &a.spec));
        Ok(outcome.summary)
    }

    // ── Host → device ────────────────────────────────────────────────

    /// Handle a characteristic write coming from the host.
    pub async fn set_requested(
        &self,
        handle: AccessoryHandle,
        service: &str,
        characteristic: &str,
        value: Value,
    ) -> Result<CommandOutcome, CoreError> {
        let (name, binding) = {
            let accessories = self.inner.accessories.lock().await;
            let accessory = accessories
                .iter()
                .find(|a| a.handle == handle)
                .ok_or(CoreError::AccessoryNotFound { handle })?;
            let binding = accessory
                .spec
                .find_characteristic(service, characteristic)
                .and_then(|c| c.set.clone())
                .ok_or_else(|| CoreError::NotSettable {
                    accessory: accessory.spec.display_name.clone(),
                    service: service.to_owned(),
                    characteristic: characteristic.to_owned(),
                })?;
            (accessory.spec.display_name.clone(), binding)
        };

        let inner = &self.inner;
        let result = set_device_value(&inner.session, &inner.remote, &inner.cache, &binding, &value).await;
        match &result {
            Ok(CommandOutcome::Sent { .. }) => info!("{name}.{service}.{characteristic} was set to {value}"),
            Ok(CommandOutcome::Suppressed) => debug!("{name}.{service}.{characteristic} set to {value} ignored by mapping"),
            Err(e) => warn!("{name}.{service}.{characteristic} could not be set to {value}: {e}"),
        }
        result
    }

    // ── Device → host ────────────────────────────────────────────────

    /// React to one push-channel event.
    pub async fn handle_push_event(&self, event: &PushEvent) {
        match event {
            PushEvent::Connect => info!("connected to domoja push channel"),
            PushEvent::Change(change) => self.on_change(change).await,
            PushEvent::Message(message) => debug!(%message, "push channel message"),
            PushEvent::ConnectError(e) if e.is_unauthorized() => {
                warn!("push channel refused the session, logging in again");
                let inner = &self.inner;
                inner.session.invalidate();
                // The push loop reconnects on its own once the new cookie is published.
                if let Err(e) = inner.session.login(&inner.remote, &inner.config.login).await {
                    error!(error = %e, "re-login after push channel refusal failed");
                }
            }
            PushEvent::ConnectError(e) => warn!(error = %e.message, "push channel connection failed"),
            PushEvent::Error(message) => {
                warn!(error = %message, "push channel error, reconnecting");
                if let Some(push) = self.inner.push.lock().await.as_ref() {
                    push.reconnect();
                }
            }
            PushEvent::Disconnect => info!("push channel closed by server"),
        }
    }

    async fn on_change(&self, change: &ChangeEvent) {
        let Some(device) = self.inner.cache.apply_change(change) else {
            error!(device = %change.id, "received change for unknown device");
            return;
        };
        debug!(device = %device.path, state = %device.state, "device changed");

        let accessories = self.inner.accessories.lock().await;
        fan_out(&*self.inner.host, &accessories, &device, &change.new_value);
    }

    async fn open_push(&self) -> Result<(), CoreError> {
        info!("starting live sync with domoja server");
        let handle = PushHandle::connect(
            self.inner.remote.base_url(),
            self.inner.config.push.clone(),
            self.inner.cancel.child_token(),
            self.inner.session.subscribe_cookie(),
        )?;
        let (rx, control) = handle.into_receiver();
        *self.inner.push.lock().await = Some(control);

        let task = tokio::spawn(live_sync_task(self.clone(), rx, self.inner.cancel.clone()));
        self.inner.task_handles.lock().await.push(task);
        Ok(())
    }
}

/// Feed push events to the bridge one at a time, so later events for a
/// device always land after earlier ones.
async fn live_sync_task<R: RemoteServer, H: HostAccessoryRegistry>(
    bridge: Bridge<R, H>,
    mut rx: broadcast::Receiver<Arc<PushEvent>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        () = bridge.handle_push_event(&event) => {}
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "live sync lagged behind the push channel");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("live sync task exiting");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mapping::StateMapping;
    use crate::spec::{CharacteristicSpec, DeviceBinding, ServiceSpec, SpecOrigin};
    use crate::testing::{FakeRemote, SentCommand, record};
    use domoja_api::ConnectError;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use serde_json::json;
    use url::Url;

    type TestBridge = Bridge<FakeRemote, MemoryHost>;

    fn lamp() -> AccessorySpec {
        AccessorySpec::expanded(
            "Lampes aquarium",
            "Switch",
            "On",
            "aquarium.lampes",
            Some(StateMapping::new(vec![json!("ON"), json!(true), json!("OFF"), json!(false)])),
            Some(StateMapping::new(vec![json!(true), json!("ON"), json!(false), json!("OFF")])),
        )
    }

    fn sensor() -> AccessorySpec {
        AccessorySpec {
            display_name: "Piscine".into(),
            disabled: false,
            origin: SpecOrigin::Detailed,
            services: vec![ServiceSpec {
                service: "TemperatureSensor".into(),
                characteristics: vec![CharacteristicSpec {
                    characteristic: "CurrentTemperature".into(),
                    get: Some(DeviceBinding::new("piscine.temperature", None)),
                    set: None,
                }],
            }],
        }
    }

    fn bridge(specs: Vec<AccessorySpec>) -> TestBridge {
        let remote = FakeRemote::new(vec![
            record("aquarium.lampes", json!("ON")),
            record("piscine.temperature", json!(26.5)),
        ]);
        let config = BridgeConfig::new(
            Url::parse("http://127.0.0.1:9/").unwrap(),
            "admin",
            SecretString::from("pw".to_owned()),
        );
        Bridge::new(config, remote, Arc::new(MemoryHost::default()), specs)
    }

    fn change(id: &str, new_value: Value) -> PushEvent {
        PushEvent::Change(ChangeEvent {
            id: id.into(),
            old_value: Value::Null,
            new_value,
            date: None,
        })
    }

    #[tokio::test]
    async fn lamp_follows_device_both_ways() {
        let bridge = bridge(vec![lamp()]);

        let summary = bridge.start().await.unwrap();
        assert_eq!(summary.created, 1);

        let handle = AccessoryHandle::for_display_name("Lampes aquarium");
        assert_eq!(bridge.host().value(handle, "Switch", "On"), Some(json!(true)));

        bridge.handle_push_event(&change("aquarium.lampes", json!("OFF"))).await;
        assert_eq!(bridge.host().value(handle, "Switch", "On"), Some(json!(false)));
        assert_eq!(
            bridge.cache().get("aquarium.lampes").unwrap().state_json(),
            json!("OFF")
        );

        let outcome = bridge
            .set_requested(handle, "Switch", "On", json!(false))
            .await
            .unwrap();
        assert!(matches!(outcome, CommandOutcome::Sent { ref command, .. } if command == "OFF"));
        assert_eq!(
            bridge.inner.remote.commands(),
            vec![SentCommand {
                cookie: "sid=1;".into(),
                path: "aquarium.lampes".into(),
                command: "OFF".into(),
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_inventory_load_retries_login_and_load() {
        let bridge = bridge(vec![lamp()]);
        bridge.inner.remote.fail_next_device_loads(2);

        bridge.start().await.unwrap();

        assert_eq!(bridge.inner.remote.login_calls(), 3);
        assert_eq!(bridge.inner.remote.device_cookies(), vec!["sid=1;", "sid=2;", "sid=3;"]);
        assert_eq!(bridge.accessories().await.len(), 1);
    }

    #[tokio::test]
    async fn config_applied_before_start_is_deferred() {
        let bridge = bridge(vec![]);

        assert_eq!(bridge.apply_config(vec![lamp(), sensor()]).await.unwrap(), None);
        assert!(bridge.host().is_empty());

        let summary = bridge.start().await.unwrap();
        assert_eq!(summary.created, 2);
    }

    #[tokio::test]
    async fn reload_with_duplicates_keeps_current_set() {
        let bridge = bridge(vec![lamp()]);
        bridge.start().await.unwrap();

        let mut dup = sensor();
        dup.display_name = "Lampes aquarium".into();
        let err = bridge.apply_config(vec![lamp(), dup]).await.unwrap_err();

        assert!(matches!(err, CoreError::DuplicateDisplayName { .. }));
        assert_eq!(bridge.accessories().await.len(), 1);
        assert_eq!(bridge.host().len(), 1);
    }

    #[tokio::test]
    async fn reload_adds_and_removes() {
        let bridge = bridge(vec![lamp()]);
        bridge.start().await.unwrap();

        let summary = bridge.apply_config(vec![sensor()]).await.unwrap().unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.removed, 1);
        assert!(!bridge.host().is_registered(AccessoryHandle::for_display_name("Lampes aquarium")));
    }

    #[tokio::test]
    async fn restored_accessory_is_kept_when_unchanged() {
        let bridge = bridge(vec![lamp()]);
        let restored = Accessory::from_spec(lamp());
        bridge.host().register(&restored).unwrap();

        bridge.configure_restored(restored.clone()).await;
        let summary = bridge.start().await.unwrap();

        assert_eq!(summary.kept, 1);
        assert_eq!(summary.created, 0);
        assert_eq!(bridge.host().value(restored.handle, "Switch", "On"), Some(json!(true)));
    }

    #[tokio::test]
    async fn restored_accessory_accepts_set_requests_before_start() {
        let bridge = bridge(vec![]);
        let restored = Accessory::from_spec(lamp());
        bridge.configure_restored(restored.clone()).await;
        bridge
            .inner
            .cache
            .replace_all([crate::device::Device::from(record("aquarium.lampes", json!("ON")))]);
        bridge
            .inner
            .session
            .login(&bridge.inner.remote, &crate::session::LoginPolicy::default())
            .await
            .unwrap();

        bridge
            .set_requested(restored.handle, "Switch", "On", json!(true))
            .await
            .unwrap();

        assert_eq!(bridge.inner.remote.commands()[0].command, "ON");
    }

    #[tokio::test]
    async fn set_requests_are_validated() {
        let bridge = bridge(vec![sensor()]);
        bridge.start().await.unwrap();
        let handle = AccessoryHandle::for_display_name("Piscine");

        let err = bridge
            .set_requested(handle, "TemperatureSensor", "CurrentTemperature", json!(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotSettable { .. }));

        let err = bridge
            .set_requested(AccessoryHandle::for_display_name("nope"), "Switch", "On", json!(true))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AccessoryNotFound { .. }));
    }

    #[tokio::test]
    async fn pushed_value_reaches_characteristic_as_received() {
        let bridge = bridge(vec![sensor()]);
        bridge.start().await.unwrap();
        let handle = AccessoryHandle::for_display_name("Piscine");

        bridge
            .handle_push_event(&change("piscine.temperature", json!("2023-12-04T14:29:28Z")))
            .await;

        assert_eq!(
            bridge.host().value(handle, "TemperatureSensor", "CurrentTemperature"),
            Some(json!("2023-12-04T14:29:28Z"))
        );
    }

    #[tokio::test]
    async fn unknown_change_is_dropped() {
        let bridge = bridge(vec![lamp()]);
        bridge.start().await.unwrap();

        bridge.handle_push_event(&change("ghost", json!(1))).await;

        assert!(bridge.cache().get("ghost").is_none());
    }

    #[tokio::test]
    async fn unauthorized_push_refusal_logs_in_again() {
        let bridge = bridge(vec![]);
        bridge.start().await.unwrap();
        let mut cookie = bridge.session().subscribe_cookie();
        let _ = cookie.borrow_and_update();

        bridge
            .handle_push_event(&PushEvent::ConnectError(ConnectError {
                message: "Not authorized".into(),
                description: Some(json!("401")),
            }))
            .await;

        assert_eq!(bridge.inner.remote.login_calls(), 2);
        assert!(cookie.has_changed().unwrap());
        assert_eq!(bridge.session().cookie(), "sid=2;");
    }

    #[tokio::test]
    async fn other_push_refusals_do_not_log_in() {
        let bridge = bridge(vec![]);
        bridge.start().await.unwrap();

        bridge
            .handle_push_event(&PushEvent::ConnectError(ConnectError {
                message: "xhr poll error".into(),
                description: Some(json!(503)),
            }))
            .await;

        assert_eq!(bridge.inner.remote.login_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn push_error_reopens_channel_at_once() {
        let bridge = bridge(vec![]);
        let reconnect = Arc::new(tokio::sync::Notify::new());
        *bridge.inner.push.lock().await = Some(PushControl::new(CancellationToken::new(), Arc::clone(&reconnect)));

        bridge
            .handle_push_event(&PushEvent::Error("websocket dropped".into()))
            .await;

        let requested = tokio::time::timeout(std::time::Duration::from_millis(1), reconnect.notified()).await;
        assert!(requested.is_ok(), "error event did not request a reconnect");
    }

    #[tokio::test]
    async fn live_sync_waits_for_both_signals() {
        let bridge = bridge(vec![lamp()]);

        bridge.host_ready().await.unwrap();
        assert!(!bridge.is_live());

        bridge.start().await.unwrap();
        assert!(bridge.is_live());

        bridge.shutdown().await;
    }
}
