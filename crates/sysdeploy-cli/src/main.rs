//! Entrypoint for the `sysdeploy` client.
//!
//! Delegates to [`sysdeploy_cli::run`] and maps its outcome to the process
//! exit code. The streams are passed unlocked because progress bars draw to
//! stdout from their own tick thread.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    sysdeploy_cli::run(std::env::args_os(), &mut stdout, &mut stderr).into()
}
