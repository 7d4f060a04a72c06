//! Tests for top-level dispatch: global options, command lookup, the root
//! check and how outcomes map to output and exit statuses.

use sysdeploy_config::Config;
use sysdeploy_daemon_types::{Operation, TransactionOptions};

use crate::client::{Identity, Services};
use crate::exit::ExitStatus;
use crate::tests::support::{
    FakeBus, FakeClients, FakeConnector, ROOT, ScriptedChannel, ScriptedInterrupts,
    StaticConfigLoader, UNPRIVILEGED, build_args, deployment,
};
use crate::{IoStreams, run_with_services};

struct Captured {
    exit: ExitStatus,
    stdout: String,
    stderr: String,
}

fn run(command: &str, clients: &FakeClients, identity: Identity) -> Captured {
    run_interrupted(command, clients, identity, ScriptedInterrupts::default())
}

fn run_interrupted(
    command: &str,
    clients: &FakeClients,
    identity: Identity,
    interrupts: ScriptedInterrupts,
) -> Captured {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let loader = StaticConfigLoader::new(Config::default());
    let services = Services {
        clients,
        interrupts: &interrupts,
        identity,
    };
    let exit = {
        let mut io = IoStreams::detached(&mut stdout, &mut stderr);
        run_with_services(build_args(command), &mut io, &loader, services)
    };
    Captured {
        exit,
        stdout: String::from_utf8(stdout).expect("stdout utf8"),
        stderr: String::from_utf8(stderr).expect("stderr utf8"),
    }
}

fn idle_daemon() -> FakeClients {
    FakeClients::new(
        FakeBus::default().with_deployments(vec![deployment("a", true)]),
        FakeConnector::default(),
    )
}

#[test]
fn missing_command_prints_usage_and_fails() {
    let clients = idle_daemon();
    let captured = run("", &clients, ROOT);

    assert_eq!(captured.exit, ExitStatus::Failure);
    assert!(captured.stderr.contains("Builtin Commands:"));
    assert!(captured.stderr.ends_with("error: No command specified\n"));
    assert_eq!(clients.connects(), 0);
}

#[test]
fn unknown_global_options_are_rejected() {
    let captured = run("--frobnicate status", &idle_daemon(), ROOT);
    assert_eq!(captured.exit, ExitStatus::Failure);
    assert!(
        captured
            .stderr
            .contains("error: Unknown option '--frobnicate'")
    );
}

#[test]
fn unknown_commands_never_reach_the_daemon() {
    let clients = idle_daemon();
    let captured = run("frobnicate", &clients, ROOT);
    assert_eq!(captured.exit, ExitStatus::Failure);
    assert!(captured.stderr.contains("error: Unknown command 'frobnicate'"));
    assert_eq!(clients.connects(), 0);
}

#[test]
fn help_lists_visible_commands_on_stdout() {
    let captured = run("--help", &idle_daemon(), ROOT);
    assert_eq!(captured.exit, ExitStatus::Success);
    assert!(captured.stdout.contains("upgrade"));
    assert!(!captured.stdout.contains("update"), "aliases stay hidden");
    assert!(captured.stderr.is_empty());
}

#[test]
fn version_is_printed() {
    let captured = run("--version", &idle_daemon(), ROOT);
    assert_eq!(captured.exit, ExitStatus::Success);
    assert!(captured.stdout.starts_with("sysdeploy "));
}

#[test]
fn command_help_is_not_a_failure() {
    let captured = run("upgrade --help", &idle_daemon(), ROOT);
    assert_eq!(captured.exit, ExitStatus::Success);
    assert!(captured.stdout.contains("--unchanged-exit-77"));
}

#[test]
fn privileged_commands_require_root() {
    let clients = idle_daemon();
    let captured = run("upgrade", &clients, UNPRIVILEGED);
    assert_eq!(captured.exit, ExitStatus::Failure);
    assert_eq!(
        captured.stderr,
        "error: This command requires root privileges\n"
    );
    assert_eq!(clients.connects(), 0);
}

#[test]
fn the_root_check_can_be_skipped() {
    let identity = Identity {
        skip_root_check: true,
        ..UNPRIVILEGED
    };
    let bus = FakeBus::default().with_deployments(vec![deployment("a", true)]);
    let clients = FakeClients::new(
        bus.clone(),
        FakeConnector::with_channels(vec![ScriptedChannel::finishing(true, "")]),
    );

    let captured = run("rollback", &clients, identity);

    assert_eq!(captured.exit, ExitStatus::Success);
    assert_eq!(bus.begun(), vec![Operation::Rollback]);
}

#[test]
fn status_needs_no_privileges() {
    let captured = run("status", &idle_daemon(), UNPRIVILEGED);
    assert_eq!(captured.exit, ExitStatus::Success);
    assert!(captured.stdout.starts_with("State: idle\nDeployments:\n"));
}

#[test]
fn status_reports_pending_reboots_when_asked() {
    let bus = FakeBus::default().with_deployments(vec![deployment("b", false), deployment("a", true)]);
    let clients = FakeClients::new(bus, FakeConnector::default());

    let plain = run("status", &clients, ROOT);
    let flagged = run("status --pending-exit-77", &clients, ROOT);

    assert_eq!(plain.exit, ExitStatus::Success);
    assert_eq!(flagged.exit, ExitStatus::RebootPending);
    assert_eq!(flagged.exit.code(), 77);
}

#[test]
fn upgrades_send_the_initiating_command_line() {
    let bus = FakeBus::default().with_deployments(vec![deployment("a", true)]);
    let clients = FakeClients::new(
        bus.clone(),
        FakeConnector::with_channels(vec![ScriptedChannel::finishing(true, "")]),
    );

    let captured = run("upgrade --install vim --download-only", &clients, ROOT);

    assert_eq!(captured.exit, ExitStatus::Success);
    assert_eq!(
        bus.begun(),
        vec![Operation::Upgrade { check_only: false }]
    );
    let options = bus.last_options().expect("options sent");
    assert_eq!(
        options,
        TransactionOptions {
            download_only: true,
            install: vec![String::from("vim")],
            initiating_command_line: String::from("sysdeploy upgrade --install vim --download-only"),
            ..TransactionOptions::default()
        }
    );
}

#[test]
fn unchanged_upgrades_can_exit_77() {
    let clients = FakeClients::new(
        FakeBus::default().with_deployments(vec![deployment("a", true)]),
        FakeConnector::with_channels(vec![ScriptedChannel::finishing(true, "")]),
    );
    let captured = run("upgrade --unchanged-exit-77", &clients, ROOT);
    assert_eq!(captured.exit, ExitStatus::Unchanged);
    assert!(captured.stderr.is_empty(), "unexpected stderr: {}", captured.stderr);
}

#[test]
fn upgrade_checks_report_the_cached_update() {
    let bus = FakeBus::default()
        .with_deployments(vec![deployment("a", true)])
        .with_cached_update(sysdeploy_daemon_types::CachedUpdate {
            origin: String::from("fedora:fedora/40/x86_64/silverblue"),
            checksum: String::from("b-5f1c2a9e"),
            version: Some(String::from("40.b")),
        });
    let clients = FakeClients::new(
        bus.clone(),
        FakeConnector::with_channels(vec![ScriptedChannel::finishing(true, "")]),
    );

    let captured = run("upgrade --check", &clients, ROOT);

    assert_eq!(captured.exit, ExitStatus::Success);
    assert!(captured.stdout.contains("AvailableUpdate:"));
    assert_eq!(bus.begun(), vec![Operation::Upgrade { check_only: true }]);
}

#[test]
fn upgrade_checks_without_an_update_exit_unchanged() {
    let clients = FakeClients::new(
        FakeBus::default().with_deployments(vec![deployment("a", true)]),
        FakeConnector::with_channels(vec![ScriptedChannel::finishing(true, "")]),
    );
    let captured = run("upgrade --check", &clients, ROOT);
    assert_eq!(captured.exit, ExitStatus::Unchanged);
    assert!(captured.stdout.contains("No updates available."));
}

#[test]
fn local_cancellation_is_reported_as_success() {
    let clients = FakeClients::new(
        FakeBus::default().with_deployments(vec![deployment("a", true)]),
        FakeConnector::with_channels(vec![ScriptedChannel::default()]),
    );

    let captured = run_interrupted("upgrade", &clients, ROOT, ScriptedInterrupts::firing(1));

    assert_eq!(captured.exit, ExitStatus::Success);
    assert!(captured.stdout.ends_with("Cancelled.\n"));
    assert!(
        captured
            .stderr
            .contains("Caught SIGINT, cancelling transaction")
    );
}

#[test]
fn failures_are_reported_on_stderr() {
    let clients = FakeClients::new(
        FakeBus::default().with_deployments(vec![deployment("a", true)]),
        FakeConnector::with_channels(vec![ScriptedChannel::finishing(
            false,
            "No space left on device",
        )]),
    );
    let captured = run("deploy 40.1", &clients, ROOT);
    assert_eq!(captured.exit, ExitStatus::Failure);
    assert_eq!(captured.stderr, "error: No space left on device\n");
}

#[test]
fn cleanup_needs_a_target() {
    let captured = run("cleanup", &idle_daemon(), ROOT);
    assert_eq!(captured.exit, ExitStatus::Failure);
    assert!(
        captured
            .stderr
            .contains("At least one cleanup option must be specified")
    );
}

#[test]
fn override_subcommands_are_dispatched() {
    let bus = FakeBus::default().with_deployments(vec![deployment("a", true)]);
    let clients = FakeClients::new(
        bus.clone(),
        FakeConnector::with_channels(vec![ScriptedChannel::finishing(true, "")]),
    );

    let captured = run("override reset --all", &clients, ROOT);

    assert_eq!(captured.exit, ExitStatus::Success);
    assert_eq!(
        bus.begun(),
        vec![Operation::OverrideReset {
            packages: Vec::new(),
            all: true,
        }]
    );
}

#[test]
fn unknown_override_subcommands_print_their_usage() {
    let captured = run("override bogus", &idle_daemon(), ROOT);
    assert_eq!(captured.exit, ExitStatus::Failure);
    assert!(captured.stderr.contains("Builtin \"override\" Commands:"));
    assert!(
        captured
            .stderr
            .ends_with("error: Unknown \"override\" subcommand 'bogus'\n")
    );
}

#[test]
fn override_subcommands_check_privileges() {
    let clients = idle_daemon();
    let captured = run("override remove vim", &clients, UNPRIVILEGED);
    assert_eq!(captured.exit, ExitStatus::Failure);
    assert!(captured.stderr.contains("requires root privileges"));
    assert_eq!(clients.connects(), 0);
}

#[test]
fn cancel_on_an_idle_daemon_is_not_an_error() {
    let captured = run("cancel", &idle_daemon(), UNPRIVILEGED);
    assert_eq!(captured.exit, ExitStatus::Success);
    assert_eq!(captured.stdout, "No active transaction.\n");
}
