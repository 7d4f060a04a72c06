use std::ffi::OsString;

use clap::Args;

use crate::client::CommandEnv;
use crate::command::{Invocation, parse_command_args};
use crate::errors::CommandError;
use crate::reconcile::reconcile;

#[derive(Debug, Args)]
struct ReloadArgs {}

/// Asks the daemon to reload its state from disk.
pub(super) fn run(
    invocation: &mut Invocation,
    args: &[OsString],
    env: &mut CommandEnv<'_>,
) -> Result<(), CommandError> {
    let parsed = parse_command_args::<ReloadArgs>(invocation, args)?;
    let session = env.session(&parsed.daemon)?;
    reconcile(session.client.bus.as_mut(), session.reload_timeout)?;
    Ok(())
}
