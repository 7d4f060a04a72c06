use std::ffi::OsString;

use clap::Args;
use serde::Serialize;
use sysdeploy_daemon_types::{CachedUpdate, Deployment};

use crate::client::{CommandEnv, Session};
use crate::command::{Invocation, parse_command_args};
use crate::errors::CommandError;
use crate::exit::ExitStatus;
use crate::locator::{LocatorPolicy, find_active};
use crate::reconcile::{DeploymentSnapshot, reconcile};

const BOOTED_MARKER: &str = "●";

#[derive(Debug, Args)]
struct StatusArgs {
    /// Output JSON
    #[arg(long)]
    json: bool,
    /// If a reboot is pending, exit 77
    #[arg(long = "pending-exit-77")]
    pending_exit_77: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    transaction: Option<&'a str>,
    deployments: &'a [Deployment],
    cached_update: Option<&'a CachedUpdate>,
}

pub(super) fn run(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<StatusArgs>(invocation, args)?;
    let status = parsed.args;
    let mut session = env.session(&parsed.daemon)?;

    let snapshot = reconcile(session.client.bus.as_mut(), session.reload_timeout)?;
    let title = active_title(&mut session)?;

    if status.json {
        let report = StatusReport {
            transaction: title.as_deref(),
            deployments: &snapshot.deployments,
            cached_update: snapshot.cached_update.as_ref(),
        };
        session.console.line(&serde_json::to_string_pretty(&report)?)?;
    } else {
        print_status(&mut session, title.as_deref(), &snapshot)?;
    }

    if status.pending_exit_77 && snapshot.reboot_pending() {
        invocation.exit = Some(ExitStatus::RebootPending);
    }
    Ok(())
}

fn active_title(session: &mut Session<'_>) -> Result<Option<String>, CommandError> {
    let active = find_active(
        session.client.bus.as_mut(),
        session.client.connector.as_ref(),
        LocatorPolicy::default(),
    )?;
    match active {
        Some(mut active) => Ok(Some(active.channel.title()?)),
        None => Ok(None),
    }
}

fn print_status(
    session: &mut Session<'_>,
    title: Option<&str>,
    snapshot: &DeploymentSnapshot,
) -> Result<(), CommandError> {
    let console = &mut *session.console;
    match title {
        Some(title) => {
            console.line("State: busy")?;
            console.line(&format!("Transaction: {title}"))?;
        }
        None => console.line("State: idle")?,
    }
    console.line("Deployments:")?;
    for deployment in &snapshot.deployments {
        for line in deployment_lines(deployment) {
            console.line(&line)?;
        }
    }
    Ok(())
}

fn deployment_lines(deployment: &Deployment) -> Vec<String> {
    let marker = if deployment.booted {
        BOOTED_MARKER
    } else {
        " "
    };
    let mut lines = vec![format!("{marker} {}:{}", deployment.osname, deployment.origin)];
    if let Some(version) = &deployment.version {
        lines.push(format!("{:>16}: {version}", "Version"));
    }
    lines.push(format!("{:>16}: {}", "Commit", deployment.checksum));
    if deployment.staged {
        lines.push(format!("{:>16}: yes", "Staged"));
    }
    if deployment.pinned {
        lines.push(format!("{:>16}: yes", "Pinned"));
    }
    lines
}
