// domoja-api: Async Rust client for the Domoja home automation server (HTTP + push channel)

pub mod auth;
pub mod client;
pub mod devices;
pub mod error;
pub mod models;
pub mod push;
pub mod transport;

pub use auth::normalize_set_cookie;
pub use client::DomojaClient;
pub use devices::COMMAND_SUCCESS_MARKER;
pub use error::Error;
pub use models::{ChangeEvent, DeviceRecord, LoginOutcome};
pub use push::{ConnectError, PushConfig, PushControl, PushEvent, PushHandle};
pub use transport::{TlsMode, TransportConfig};
