// Scripted stand-in for the device server, shared by unit tests.
#![allow(clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use url::Url;

use domoja_api::{DeviceRecord, Error, LoginOutcome};

use crate::remote::RemoteServer;

#[derive(Debug, Clone, Copy)]
pub enum LoginScript {
    NoCookie,
    Fail,
}

#[derive(Debug, Clone, Copy)]
pub enum CommandScript {
    Unauthorized,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCommand {
    pub cookie: String,
    pub path: String,
    pub command: String,
}

pub fn record(path: &str, state: Value) -> DeviceRecord {
    serde_json::from_value(json!({ "id": path, "path": path, "state": state })).unwrap()
}

/// Succeeds unless a failure was scripted for the next call.
pub struct FakeRemote {
    base_url: Url,
    devices: Mutex<Vec<DeviceRecord>>,
    logins: Mutex<VecDeque<LoginScript>>,
    command_script: Mutex<VecDeque<CommandScript>>,
    device_failures: AtomicU32,
    login_calls: AtomicU32,
    sessions: AtomicU32,
    login_delay: Mutex<Duration>,
    commands: Mutex<Vec<SentCommand>>,
    device_cookies: Mutex<Vec<String>>,
}

impl FakeRemote {
    pub fn new(devices: Vec<DeviceRecord>) -> Self {
        Self {
            base_url: Url::parse("http://127.0.0.1:9/").unwrap(),
            devices: Mutex::new(devices),
            logins: Mutex::new(VecDeque::new()),
            command_script: Mutex::new(VecDeque::new()),
            device_failures: AtomicU32::new(0),
            login_calls: AtomicU32::new(0),
            sessions: AtomicU32::new(0),
            login_delay: Mutex::new(Duration::ZERO),
            commands: Mutex::new(Vec::new()),
            device_cookies: Mutex::new(Vec::new()),
        }
    }

    pub fn script_logins(&self, script: impl IntoIterator<Item = LoginScript>) {
        self.logins.lock().unwrap().extend(script);
    }

    pub fn script_commands(&self, script: impl IntoIterator<Item = CommandScript>) {
        self.command_script.lock().unwrap().extend(script);
    }

    pub fn fail_next_device_loads(&self, count: u32) {
        self.device_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_devices(&self, devices: Vec<DeviceRecord>) {
        *self.devices.lock().unwrap() = devices;
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.login_delay.lock().unwrap() = delay;
    }

    pub fn login_calls(&self) -> u32 {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<SentCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn device_cookies(&self) -> Vec<String> {
        self.device_cookies.lock().unwrap().clone()
    }
}

impl RemoteServer for FakeRemote {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn login(&self, _username: &str, _password: &SecretString) -> Result<LoginOutcome, Error> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.login_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let next = self.logins.lock().unwrap().pop_front();
        match next {
            Some(LoginScript::NoCookie) => Ok(LoginOutcome::NoSession { status: 200 }),
            Some(LoginScript::Fail) => Err(Error::Http {
                status: 503,
                body: "Service Unavailable".into(),
            }),
            None => {
                let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(LoginOutcome::Session(format!("sid={n};")))
            }
        }
    }

    async fn list_devices(&self, cookie: &str) -> Result<Vec<DeviceRecord>, Error> {
        self.device_cookies.lock().unwrap().push(cookie.to_owned());
        let failures = self.device_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.device_failures.store(failures - 1, Ordering::SeqCst);
            return Err(Error::EmptyInventory { status: 200 });
        }
        Ok(self.devices.lock().unwrap().clone())
    }

    async fn send_command(&self, cookie: &str, path: &str, command: &str) -> Result<(), Error> {
        self.commands.lock().unwrap().push(SentCommand {
            cookie: cookie.to_owned(),
            path: path.to_owned(),
            command: command.to_owned(),
        });
        let next = self.command_script.lock().unwrap().pop_front();
        match next {
            Some(CommandScript::Unauthorized) => Err(Error::Unauthorized),
            Some(CommandScript::Rejected) => Err(Error::CommandRejected {
                status: 500,
                body: "boom".into(),
            }),
            None => Ok(()),
        }
    }
}
