// ── Accessory reconciler ──
//
// Diff desired specs against the previously materialized accessories and
// issue register/unregister intents to the host. A changed spec is always
// a recreate, never an in-place mutation. Individual failures are logged
// and skipped; only duplicate display names refuse the whole pass.

use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::cache::DeviceCache;
use crate::error::CoreError;
use crate::host::{Accessory, HostAccessoryRegistry};
use crate::identity::IdentityPolicy;
use crate::mapping::transform;
use crate::spec::{AccessorySpec, SpecOrigin};

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub created: usize,
    pub updated: usize,
    pub kept: usize,
    pub disabled_skipped: usize,
    pub removed: usize,
    /// Specs not processed: missing device or host refusal.
    pub skipped: usize,
}

/// Result of [`reconcile`]: the new accessory set and its counts.
#[derive(Debug, Clone, Default)]
pub struct ReconcileOutcome {
    pub accessories: Vec<Accessory>,
    pub summary: ReconcileSummary,
}

/// Refuse display names shared by two enabled specs.
pub fn check_unique_display_names(specs: &[AccessorySpec]) -> Result<(), CoreError> {
    let mut seen = HashSet::new();
    for spec in specs.iter().filter(|s| s.is_enabled()) {
        if !seen.insert(spec.display_name.as_str()) {
            error!(accessory = %spec.display_name, "duplicate accessory found in configuration");
            return Err(CoreError::DuplicateDisplayName {
                name: spec.display_name.clone(),
            });
        }
    }
    Ok(())
}

/// Reconcile `desired` against `previous`, then push current device state
/// into every `get` characteristic of the resulting set.
pub fn reconcile<H: HostAccessoryRegistry + ?Sized>(
    host: &H,
    cache: &DeviceCache,
    policy: IdentityPolicy,
    desired: &[AccessorySpec],
    previous: Vec<Accessory>,
) -> Result<ReconcileOutcome, CoreError> {
    check_unique_display_names(desired)?;

    let mut pool: Vec<Option<Accessory>> = previous.into_iter().map(Some).collect();
    let mut out: Vec<Accessory> = Vec::with_capacity(desired.len());
    let mut summary = ReconcileSummary::default();

    for spec in desired {
        let name = spec.display_name.as_str();

        if spec.origin == SpecOrigin::Expanded {
            if let Some(missing) = spec.bound_devices().into_iter().find(|d| !cache.contains(d)) {
                warn!(accessory = name, device = missing, "could not find device while loading accessories");
                summary.skipped += 1;
                continue;
            }
        }

        let existing = claim(&mut pool, policy, spec);

        if spec.disabled {
            if let Some(old) = existing {
                debug!(accessory = name, "accessory disabled in configuration, removing");
                unregister(host, &old);
                summary.removed += 1;
            }
            summary.disabled_skipped += 1;
            continue;
        }

        match existing {
            Some(old) if old.spec.structurally_eq(spec) => {
                debug!(accessory = name, "accessory already exists, no change detected");
                out.push(old);
                summary.kept += 1;
            }
            Some(old) => {
                debug!(accessory = name, "change in configuration, recreating accessory");
                unregister(host, &old);
                if create(host, &mut pool, &mut summary, spec, &mut out) {
                    summary.updated += 1;
                }
            }
            None => {
                debug!(accessory = name, "new accessory");
                if create(host, &mut pool, &mut summary, spec, &mut out) {
                    summary.created += 1;
                }
            }
        }
    }

    for stale in pool.into_iter().flatten() {
        debug!(accessory = stale.display_name(), "accessory no longer configured, removing");
        unregister(host, &stale);
        summary.removed += 1;
    }

    for accessory in &out {
        initial_sync(host, cache, accessory);
    }

    info!(
        "Loaded {} new accessory(ies) from configuration, {} unchanged, {} updated, {} disabled, {} removed.",
        summary.created, summary.kept, summary.updated, summary.disabled_skipped, summary.removed
    );

    Ok(ReconcileOutcome {
        accessories: out,
        summary,
    })
}

/// Take the previous accessory matching `spec`, preferring an exact match
/// when several share the same identity.
fn claim(pool: &mut [Option<Accessory>], policy: IdentityPolicy, spec: &AccessorySpec) -> Option<Accessory> {
    let candidates: Vec<usize> = pool
        .iter()
        .enumerate()
        .filter_map(|(i, slot)| {
            slot.as_ref()
                .filter(|a| policy.matches(&a.spec, spec))
                .map(|_| i)
        })
        .collect();

    let chosen = candidates
        .iter()
        .copied()
        .find(|&i| pool[i].as_ref().is_some_and(|a| a.spec.structurally_eq(spec)))
        .or_else(|| candidates.first().copied())?;

    pool[chosen].take()
}

/// Register a fresh accessory. An unclaimed previous accessory holding the
/// same handle is unregistered first so the host never sees a duplicate.
fn create<H: HostAccessoryRegistry + ?Sized>(
    host: &H,
    pool: &mut [Option<Accessory>],
    summary: &mut ReconcileSummary,
    spec: &AccessorySpec,
    out: &mut Vec<Accessory>,
) -> bool {
    let accessory = Accessory::from_spec(spec.clone());

    if let Some(slot) = pool
        .iter_mut()
        .find(|slot| slot.as_ref().is_some_and(|a| a.handle == accessory.handle))
    {
        if let Some(stale) = slot.take() {
            unregister(host, &stale);
            summary.removed += 1;
        }
    }

    match host.register(&accessory) {
        Ok(()) => {
            out.push(accessory);
            true
        }
        Err(e) => {
            error!(accessory = accessory.display_name(), error = %e, "no accessory created");
            summary.skipped += 1;
            false
        }
    }
}

fn unregister<H: HostAccessoryRegistry + ?Sized>(host: &H, accessory: &Accessory) {
    if let Err(e) = host.unregister(accessory.handle) {
        warn!(accessory = accessory.display_name(), error = %e, "failed to unregister accessory");
    }
}

/// Push each bound device's current state into its `get` characteristic.
fn initial_sync<H: HostAccessoryRegistry + ?Sized>(host: &H, cache: &DeviceCache, accessory: &Accessory) {
    for (service, c) in accessory.spec.characteristics() {
        let Some(get) = &c.get else {
            continue;
        };
        let Some(device) = cache.get(&get.device) else {
            warn!(
                accessory = accessory.display_name(),
                service,
                characteristic = %c.characteristic,
                device = %get.device,
                "could not find device, characteristic not initialized"
            );
            continue;
        };

        let value = transform(get.mapping.as_ref(), &device.state_json());
        if value.is_null() {
            continue;
        }
        debug!(
            accessory = accessory.display_name(),
            service,
            characteristic = %c.characteristic,
            %value,
            "initial characteristic value"
        );
        if let Err(e) = host.update_characteristic(accessory.handle, service, &c.characteristic, value) {
            error!(accessory = accessory.display_name(), error = %e, "error while preparing update of accessory");
        }
    }
}
