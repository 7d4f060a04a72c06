//! Requests and signals on a transaction's private connection.

use serde::{Deserialize, Serialize};

/// Requests a client may send to a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum TransactionRequest {
    /// Asks for the transaction's title.
    GetTitle,
    /// Tells the daemon the client is subscribed and ready for events.
    Start,
    /// Requests cooperative cancellation. The daemon does not reply.
    Cancel,
}

/// Replies and signals emitted by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum TransactionMessage {
    /// Reply to [`TransactionRequest::GetTitle`].
    Title {
        /// Short description such as `upgrade` or `rebase fedora:rawhide`.
        title: String,
    },
    /// Reply to [`TransactionRequest::Start`].
    Started {
        /// `false` when another client had already started the transaction.
        just_started: bool,
    },
    /// Free-form informational text.
    Message {
        /// Text to print.
        text: String,
    },
    /// A named unit of work has begun.
    TaskBegin {
        /// Task label.
        label: String,
    },
    /// The current task has finished.
    TaskEnd {
        /// Completion label, usually `done`.
        label: String,
    },
    /// Progress of a task measured in percent.
    PercentProgress {
        /// Task label.
        label: String,
        /// Completion percentage, 0 to 100.
        percent: u32,
    },
    /// Byte-level download progress.
    DownloadProgress(DownloadCounters),
    /// Signature verification progress.
    SignatureProgress {
        /// Commit whose signatures were checked.
        commit: String,
    },
    /// The current progress display should be closed.
    ProgressEnd,
    /// Terminal signal; nothing follows it.
    Finished {
        /// Whether the operation succeeded.
        success: bool,
        /// Failure detail, empty on success.
        #[serde(default)]
        message: String,
    },
}

/// Counters carried by [`TransactionMessage::DownloadProgress`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadCounters {
    /// Seconds since the epoch when the pull started.
    pub start_time: u64,
    /// Seconds elapsed since the pull started.
    pub elapsed_secs: u64,
    /// Fetches still in flight.
    pub outstanding_fetches: u32,
    /// Object writes still in flight.
    pub outstanding_writes: u32,
    /// Metadata objects scanned so far.
    pub n_scanned_metadata: u32,
    /// Metadata objects fetched so far.
    pub metadata_fetched: u32,
    /// Metadata fetches still in flight.
    pub outstanding_metadata_fetches: u32,
    /// Static delta parts in the pull.
    pub total_delta_parts: u32,
    /// Static delta parts fetched so far.
    pub fetched_delta_parts: u32,
    /// Static delta superblocks in the pull.
    pub total_delta_superblocks: u32,
    /// Total size in bytes of all delta parts.
    pub total_delta_part_size: u64,
    /// Objects fetched so far.
    pub fetched: u32,
    /// Objects requested in total.
    pub requested: u32,
    /// Bytes received so far.
    pub bytes_transferred: u64,
    /// Current transfer rate in bytes per second.
    pub bytes_sec: u64,
}
