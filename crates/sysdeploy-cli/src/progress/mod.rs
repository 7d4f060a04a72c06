//! Decoding of transaction progress signals into console actions.
//!
//! [`ProgressState::apply`] is a pure transition: it takes the current state
//! and one event and yields the next state plus the console actions to
//! perform. Rendering lives behind the [`Console`] trait so the decoder can
//! be exercised without a terminal or a daemon.

mod console;

use indicatif::DecimalBytes;
use sysdeploy_daemon_types::{DownloadCounters, TransactionMessage};

pub(crate) use console::{Console, TerminalConsole};

/// A transaction signal relevant to progress display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProgressEvent {
    Message(String),
    TaskBegin(String),
    TaskEnd(String),
    PercentProgress { label: String, percent: u32 },
    DownloadProgress(DownloadCounters),
    SignatureProgress,
    ProgressEnd,
    Finished { success: bool, message: String },
}

impl ProgressEvent {
    /// Converts a wire signal, dropping replies that carry no progress.
    pub(crate) fn from_message(message: TransactionMessage) -> Option<Self> {
        let event = match message {
            TransactionMessage::Title { .. } | TransactionMessage::Started { .. } => return None,
            TransactionMessage::Message { text } => Self::Message(text),
            TransactionMessage::TaskBegin { label } => Self::TaskBegin(label),
            TransactionMessage::TaskEnd { label } => Self::TaskEnd(label),
            TransactionMessage::PercentProgress { label, percent } => {
                Self::PercentProgress { label, percent }
            }
            TransactionMessage::DownloadProgress(counters) => Self::DownloadProgress(counters),
            TransactionMessage::SignatureProgress { .. } => Self::SignatureProgress,
            TransactionMessage::ProgressEnd => Self::ProgressEnd,
            TransactionMessage::Finished { success, message } => {
                Self::Finished { success, message }
            }
        };
        Some(event)
    }
}

/// Something the console should do in response to an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConsoleAction {
    Print(String),
    BeginTask(String),
    BeginPercent(String),
    SetPercent(u32),
    SetMessage(String),
    EndTask(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskKind {
    Spinner,
    Percent,
}

/// Progress of one attached transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ProgressState {
    task: Option<TaskKind>,
    error: Option<String>,
    complete: bool,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Step {
    pub(crate) state: ProgressState,
    pub(crate) actions: Vec<ConsoleAction>,
    /// A task was begun while another was still open.
    pub(crate) replaced_open_task: bool,
}

impl ProgressState {
    #[cfg(test)]
    pub(crate) const fn task_open(&self) -> bool {
        self.task.is_some()
    }

    pub(crate) const fn is_complete(&self) -> bool {
        self.complete
    }

    /// Failure message reported by the daemon, if the transaction failed.
    pub(crate) fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub(crate) fn apply(mut self, event: &ProgressEvent) -> Step {
        let mut actions = Vec::new();
        let mut replaced_open_task = false;
        if self.complete {
            return Step {
                state: self,
                actions,
                replaced_open_task,
            };
        }

        match event {
            ProgressEvent::Message(text) => actions.push(ConsoleAction::Print(text.clone())),
            ProgressEvent::TaskBegin(label) => {
                if self.task.take().is_some() {
                    replaced_open_task = true;
                    actions.push(ConsoleAction::EndTask(None));
                }
                actions.push(ConsoleAction::BeginTask(label.clone()));
                self.task = Some(TaskKind::Spinner);
            }
            ProgressEvent::TaskEnd(label) => {
                if self.task.take().is_some() {
                    actions.push(ConsoleAction::EndTask(Some(label.clone())));
                }
            }
            ProgressEvent::PercentProgress { label, percent } => {
                if self.task.is_none() {
                    actions.push(ConsoleAction::BeginPercent(label.clone()));
                    self.task = Some(TaskKind::Percent);
                }
                actions.push(ConsoleAction::SetPercent((*percent).min(100)));
            }
            ProgressEvent::DownloadProgress(counters) => {
                let line = download_summary(counters);
                if self.task.is_some() {
                    actions.push(ConsoleAction::SetMessage(line));
                } else {
                    actions.push(ConsoleAction::BeginTask(line));
                    self.task = Some(TaskKind::Spinner);
                }
            }
            // Signature lines would interleave with the transport's own
            // progress reporting.
            ProgressEvent::SignatureProgress => {}
            ProgressEvent::ProgressEnd => {
                if self.task.take().is_some() {
                    actions.push(ConsoleAction::EndTask(None));
                }
            }
            ProgressEvent::Finished { success, message } => {
                if self.task.take().is_some() {
                    actions.push(ConsoleAction::EndTask(None));
                }
                if !success {
                    self.error = Some(message.clone());
                }
                self.complete = true;
            }
        }

        Step {
            state: self,
            actions,
            replaced_open_task,
        }
    }

    /// Closes any open task without a completion label, for when monitoring
    /// stops before the daemon says so.
    pub(crate) fn abandon(mut self) -> (Self, Option<ConsoleAction>) {
        let action = self.task.take().map(|_| ConsoleAction::EndTask(None));
        (self, action)
    }
}

/// Builds the single status line shown for a download progress update.
///
/// Only one line fits, so the most specific activity wins: delta parts,
/// then metadata, then plain objects while fetches are outstanding; then
/// writes; then the metadata scan.
pub(crate) fn download_summary(counters: &DownloadCounters) -> String {
    if counters.outstanding_fetches > 0 {
        let rate = transfer_rate(counters.bytes_sec);
        let transferred = DecimalBytes(counters.bytes_transferred);
        if counters.total_delta_parts > 0 {
            format!(
                "Receiving delta parts: {}/{} {rate} {transferred}/{}",
                counters.fetched_delta_parts,
                counters.total_delta_parts,
                DecimalBytes(counters.total_delta_part_size)
            )
        } else if counters.outstanding_metadata_fetches > 0 {
            format!(
                "Receiving metadata objects: {}/(estimating) {rate} {transferred}",
                counters.metadata_fetched
            )
        } else {
            let percent = (u64::from(counters.fetched) * 100)
                .checked_div(u64::from(counters.requested))
                .unwrap_or(0);
            format!(
                "Receiving objects: {percent}% ({}/{}) {rate} {transferred}",
                counters.fetched, counters.requested
            )
        }
    } else if counters.outstanding_writes > 0 {
        format!("Writing objects: {}", counters.outstanding_writes)
    } else {
        format!("Scanning metadata: {}", counters.n_scanned_metadata)
    }
}

fn transfer_rate(bytes_sec: u64) -> String {
    if bytes_sec == 0 {
        String::from("-")
    } else {
        format!("{}/s", DecimalBytes(bytes_sec))
    }
}
