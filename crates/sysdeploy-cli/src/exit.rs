//! Process outcomes and their exit codes.

use std::process::ExitCode;

/// Exit code shared by "nothing changed" and "reboot pending" outcomes.
pub const EXIT_SOFT: u8 = 77;

/// How a command finished.
///
/// Commands report intent; the numeric code is only chosen at the process
/// boundary, so distinct outcomes stay distinguishable inside the client even
/// where they share a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExitStatus {
    #[default]
    Success,
    Failure,
    /// The operation completed without changing anything.
    Unchanged,
    /// A reboot is needed before the next deployment takes effect.
    RebootPending,
}

impl ExitStatus {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Unchanged | Self::RebootPending => EXIT_SOFT,
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        Self::from(status.code())
    }
}
