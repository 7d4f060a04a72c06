//! Test support utilities for sysdeploy CLI coverage.
//!
//! Supplies in-memory fakes for unit tests across the crate, plus a
//! socket-level fake daemon and a test world for behavioural scenarios.

mod fake_daemon;
mod fakes;

use std::cell::RefCell;
use std::ffi::OsString;

use anyhow::{Context, Result, ensure};
use rstest::fixture;
use sysdeploy_config::{Config, SocketEndpoint};

use crate::client::{Identity, Services, SystemClients};
use crate::config::ConfigLoader;
use crate::errors::AppError;
use crate::exit::ExitStatus;
use crate::{IoStreams, run_with_services};

pub(in crate::tests) use fake_daemon::{DaemonScript, FakeDaemon};
pub(crate) use fakes::{
    FAKE_TRANSACTION, FakeBus, FakeClients, FakeConnector, RecordingConsole,
    ScriptedChannel, ScriptedInterrupts, deployment,
};

/// A config loader that returns a fixed configuration for tests.
pub(in crate::tests) struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    pub(in crate::tests) fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.config.clone())
    }
}

/// An identity allowed to run privileged commands.
pub(in crate::tests) const ROOT: Identity = Identity {
    euid: 0,
    skip_root_check: false,
};

/// An identity refused privileged commands.
pub(in crate::tests) const UNPRIVILEGED: Identity = Identity {
    euid: 1000,
    skip_root_check: false,
};

/// Splits a scenario command line into arguments, after the program name.
pub(in crate::tests) fn build_args(command: &str) -> Vec<OsString> {
    let mut args = vec![OsString::from("sysdeploy")];
    args.extend(
        command
            .trim()
            .trim_matches('"')
            .split_whitespace()
            .map(OsString::from),
    );
    args
}

/// Test world holding CLI state, daemon instance, and captured output.
pub(in crate::tests) struct TestWorld {
    pub config: Config,
    pub identity: Identity,
    pub daemon: Option<FakeDaemon>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit: Option<ExitStatus>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self {
            config: Config::default(),
            identity: ROOT,
            daemon: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit: None,
        }
    }
}

impl TestWorld {
    pub fn start_daemon(&mut self, script: DaemonScript) -> Result<()> {
        let daemon = FakeDaemon::spawn(script)?;
        let endpoint = SocketEndpoint::tcp("127.0.0.1", daemon.port());
        self.config.bus_socket = endpoint.clone();
        self.config.peer_socket = endpoint;
        self.config.registration_backoff_ms = 0;
        self.daemon = Some(daemon);
        Ok(())
    }

    pub fn run(&mut self, command: &str) {
        self.stdout.clear();
        self.stderr.clear();
        let args = build_args(command);
        let loader = StaticConfigLoader::new(self.config.clone());
        let interrupts = ScriptedInterrupts::default();
        let services = Services {
            clients: &SystemClients,
            interrupts: &interrupts,
            identity: self.identity,
        };
        let mut io = IoStreams::detached(&mut self.stdout, &mut self.stderr);
        self.exit = Some(run_with_services(args, &mut io, &loader, services));
    }

    pub fn daemon(&self) -> Result<&FakeDaemon> {
        self.daemon.as_ref().context("fake daemon not started")
    }

    pub fn stdout_text(&self) -> Result<String> {
        String::from_utf8(self.stdout.clone()).context("stdout was not UTF-8")
    }

    pub fn stderr_text(&self) -> Result<String> {
        String::from_utf8(self.stderr.clone()).context("stderr was not UTF-8")
    }

    pub fn assert_exit_code(&self, expected: u8) -> Result<()> {
        let exit = self.exit.context("exit status recorded")?;
        ensure!(
            exit.code() == expected,
            "expected exit code {expected}, got {exit:?}"
        );
        Ok(())
    }
}

#[fixture]
pub(in crate::tests) fn world() -> RefCell<TestWorld> {
    RefCell::new(TestWorld::default())
}
