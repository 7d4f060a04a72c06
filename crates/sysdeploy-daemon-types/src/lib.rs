//! Wire types exchanged between the `sysdeploy` client and `sysdeployd`.
//!
//! Every message travels as a single JSON object terminated by a newline.
//! Calls on the system bus are tagged by `method`, bus replies by `kind`,
//! and the per-transaction stream by `signal`. The daemon owns the
//! semantics of each operation; this crate only fixes the shapes.

mod bus;
mod deployment;
mod transaction;

pub use bus::{BusCall, BusMethod, BusReply, RemoteErrorKind, WELL_KNOWN_NAME, WatchTopic};
pub use deployment::{CachedUpdate, CleanupTarget, Deployment, Operation, TransactionOptions};
pub use transaction::{DownloadCounters, TransactionMessage, TransactionRequest};
