// ── Command dispatcher ──
//
// Outbound path: characteristic value → mapping → `POST devices/<path>`.
// One inline re-login and one retry on an authorization failure, nothing
// more; the host expects a bounded-time answer.

use serde_json::Value;
use tracing::{debug, error};

use crate::cache::DeviceCache;
use crate::error::CoreError;
use crate::mapping::{display_value, transform};
use crate::remote::RemoteServer;
use crate::session::{LoginPolicy, SessionManager};
use crate::spec::DeviceBinding;

/// What happened to a set request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The server accepted `command` for `device`.
    Sent { device: String, command: String },
    /// The mapping produced `null`; nothing was sent.
    Suppressed,
}

/// Transform `value` through the `set` binding and send it.
pub async fn set_device_value<R: RemoteServer>(
    session: &SessionManager,
    remote: &R,
    cache: &DeviceCache,
    binding: &DeviceBinding,
    value: &Value,
) -> Result<CommandOutcome, CoreError> {
    let Some(device) = cache.get(&binding.device) else {
        error!(device = %binding.device, "could not find device to set");
        return Err(CoreError::DeviceNotFound {
            path: binding.device.clone(),
        });
    };

    let input = Value::String(display_value(value));
    let mapped = transform(binding.mapping.as_ref(), &input);
    if mapped.is_null() {
        debug!(device = %device.path, "mapped to null, command suppressed");
        return Ok(CommandOutcome::Suppressed);
    }
    let command = display_value(&mapped);

    debug!(device = %device.path, %command, "setting device state");
    let first = remote
        .send_command(&session.cookie(), &device.path, &command)
        .await;

    let err = match first {
        Ok(()) => return Ok(sent(&device.path, command)),
        Err(e) if e.is_auth_expired() => {
            debug!(device = %device.path, "cannot set device value, retrying with login first");
            session.invalidate();
            match session.login(remote, &LoginPolicy::inline()).await {
                Ok(()) => remote
                    .send_command(&session.cookie(), &device.path, &command)
                    .await
                    .map(|()| sent(&device.path, command.clone()))
                    .map_err(|e| rejected(&device.path, e)),
                Err(login_err) => Err(login_err),
            }
        }
        Err(e) => Err(rejected(&device.path, e)),
    };

    if let Err(ref e) = err {
        error!(device = %device.path, %command, error = %e, "cannot set device value");
    }
    err
}

fn sent(device: &str, command: String) -> CommandOutcome {
    debug!(device, %command, "device state set");
    CommandOutcome::Sent {
        device: device.to_owned(),
        command,
    }
}

fn rejected(device: &str, err: domoja_api::Error) -> CoreError {
    match err {
        domoja_api::Error::CommandRejected { status, body } => CoreError::CommandRejected {
            device: device.to_owned(),
            status,
            body,
        },
        domoja_api::Error::Unauthorized => CoreError::CommandRejected {
            device: device.to_owned(),
            status: 401,
            body: "Unauthorized".into(),
        },
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::mapping::StateMapping;
    use crate::testing::{CommandScript, FakeRemote, LoginScript, SentCommand, record};
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use serde_json::json;

    struct Fixture {
        session: SessionManager,
        remote: FakeRemote,
        cache: DeviceCache,
    }

    async fn fixture() -> Fixture {
        let remote = FakeRemote::new(vec![]);
        let session = SessionManager::new("admin", SecretString::from("pw".to_owned()));
        session.login(&remote, &LoginPolicy::default()).await.unwrap();
        let cache = DeviceCache::new();
        cache.replace_all([Device::from(record("aquarium.lampes", json!("ON")))]);
        Fixture { session, remote, cache }
    }

    fn lamp_set() -> DeviceBinding {
        DeviceBinding::new(
            "aquarium.lampes",
            Some(StateMapping::new(vec![json!(true), json!("ON"), json!(false), json!("OFF")])),
        )
    }

    #[tokio::test]
    async fn mapped_value_is_sent() {
        let f = fixture().await;

        let outcome = set_device_value(&f.session, &f.remote, &f.cache, &lamp_set(), &json!(false))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CommandOutcome::Sent {
                device: "aquarium.lampes".into(),
                command: "OFF".into()
            }
        );
        assert_eq!(
            f.remote.commands(),
            vec![SentCommand {
                cookie: "sid=1;".into(),
                path: "aquarium.lampes".into(),
                command: "OFF".into(),
            }]
        );
    }

    #[tokio::test]
    async fn unmapped_value_is_sent_as_text() {
        let f = fixture().await;
        let binding = DeviceBinding::new("aquarium.lampes", None);

        set_device_value(&f.session, &f.remote, &f.cache, &binding, &json!(21.0))
            .await
            .unwrap();

        assert_eq!(f.remote.commands()[0].command, "21");
    }

    #[tokio::test]
    async fn null_mapping_suppresses_command() {
        let f = fixture().await;
        let binding = DeviceBinding::new(
            "aquarium.lampes",
            Some(StateMapping::new(vec![json!(true), json!("ON"), json!("*"), Value::Null])),
        );

        let outcome = set_device_value(&f.session, &f.remote, &f.cache, &binding, &json!(false))
            .await
            .unwrap();

        assert_eq!(outcome, CommandOutcome::Suppressed);
        assert!(f.remote.commands().is_empty());
    }

    #[tokio::test]
    async fn unauthorized_triggers_login_and_one_retry() {
        let f = fixture().await;
        f.remote.script_commands([CommandScript::Unauthorized]);

        set_device_value(&f.session, &f.remote, &f.cache, &lamp_set(), &json!(true))
            .await
            .unwrap();

        let commands = f.remote.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].cookie, "sid=1;");
        assert_eq!(commands[1].cookie, "sid=2;");
        assert_eq!(f.remote.login_calls(), 2);
    }

    #[tokio::test]
    async fn second_unauthorized_is_surfaced() {
        let f = fixture().await;
        f.remote
            .script_commands([CommandScript::Unauthorized, CommandScript::Unauthorized]);

        let err = set_device_value(&f.session, &f.remote, &f.cache, &lamp_set(), &json!(true))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::CommandRejected { status: 401, .. }), "got {err:?}");
        assert_eq!(f.remote.commands().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_inline_login_is_surfaced() {
        let f = fixture().await;
        f.remote.script_commands([CommandScript::Unauthorized]);
        f.remote
            .script_logins(std::iter::repeat_n(LoginScript::Fail, 5));

        let err = set_device_value(&f.session, &f.remote, &f.cache, &lamp_set(), &json!(true))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::LoginAttemptsExhausted { attempts: 3 }), "got {err:?}");
        assert_eq!(f.remote.commands().len(), 1);
    }

    #[tokio::test]
    async fn other_failures_are_not_retried() {
        let f = fixture().await;
        f.remote.script_commands([CommandScript::Rejected]);

        let err = set_device_value(&f.session, &f.remote, &f.cache, &lamp_set(), &json!(true))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::CommandRejected { status: 500, .. }));
        assert_eq!(f.remote.commands().len(), 1);
        assert_eq!(f.remote.login_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn relogin_gives_up_while_another_login_keeps_failing() {
        use std::sync::Arc;
        use std::time::Duration;

        let f = fixture().await;
        let (session, remote) = (Arc::new(f.session), Arc::new(f.remote));
        remote.script_logins(std::iter::repeat_n(LoginScript::NoCookie, 10_000));
        remote.script_commands([CommandScript::Unauthorized]);

        let background = {
            let (session, remote) = (Arc::clone(&session), Arc::clone(&remote));
            tokio::spawn(async move { session.login(&*remote, &LoginPolicy::default()).await })
        };
        tokio::task::yield_now().await;

        let started = tokio::time::Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(120),
            set_device_value(&session, &*remote, &f.cache, &lamp_set(), &json!(true)),
        )
        .await
        .expect("command must answer in bounded time");

        assert!(matches!(result, Err(CoreError::LoginTimeout { .. })), "got {result:?}");
        assert!(started.elapsed() <= Duration::from_secs(10));
        background.abort();
    }

    #[tokio::test]
    async fn unknown_device_is_an_error() {
        let f = fixture().await;
        let binding = DeviceBinding::new("ghost", None);

        let err = set_device_value(&f.session, &f.remote, &f.cache, &binding, &json!(1))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::DeviceNotFound { .. }));
        assert!(f.remote.commands().is_empty());
    }
}
