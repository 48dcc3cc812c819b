// domoja-core: reconciliation and live-sync engine between Domoja devices
// and the accessories a bridge host exposes.

pub mod bridge;
pub mod cache;
pub mod command;
pub mod config;
pub mod device;
pub mod equality;
pub mod error;
pub mod host;
pub mod identity;
pub mod mapping;
pub mod reconcile;
pub mod remote;
pub mod session;
pub mod spec;
pub mod summary;
pub mod sync;

#[cfg(test)]
mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::Bridge;
pub use cache::DeviceCache;
pub use command::CommandOutcome;
pub use config::{BridgeConfig, TlsVerification};
pub use device::{Device, DeviceValue};
pub use error::CoreError;
pub use host::{
    Accessory, AccessoryHandle, HostAccessoryRegistry, HostError, HostedAccessory, MemoryHost,
    ServiceCatalog,
};
pub use identity::IdentityPolicy;
pub use mapping::{StateMapping, transform};
pub use reconcile::{ReconcileSummary, check_unique_display_names};
pub use remote::RemoteServer;
pub use session::{LoginPolicy, SessionManager, SessionState};
pub use spec::{AccessorySpec, CharacteristicSpec, DeviceBinding, ServiceSpec, SpecOrigin};
pub use summary::{CharacteristicSummary, summarize};

// Wire-level types that show up in this crate's public API.
pub use domoja_api::{ChangeEvent, DomojaClient, PushConfig, PushEvent};
