//! Login-session lookups behind the client registration policy.
//!
//! The login manager records one state file per user under its runtime
//! directory. Only users with an `active` session, or root, may register as
//! clients; the daemon refuses everyone else.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

/// Session states recorded by the login manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Offline,
    Lingering,
    Online,
    Active,
    Closing,
}

impl SessionState {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "offline" => Some(Self::Offline),
            "lingering" => Some(Self::Lingering),
            "online" => Some(Self::Online),
            "active" => Some(Self::Active),
            "closing" => Some(Self::Closing),
            _ => None,
        }
    }
}

pub(crate) trait SessionTracker {
    /// Returns the state of `uid`'s sessions, or `None` when unknown.
    fn user_state(&self, uid: u32) -> Option<SessionState>;
}

/// Reads user state files from the login manager's runtime directory.
pub(crate) struct LoginSessions {
    users_dir: Utf8PathBuf,
}

impl LoginSessions {
    pub(crate) fn new(users_dir: &Utf8Path) -> Self {
        Self {
            users_dir: users_dir.to_path_buf(),
        }
    }
}

impl SessionTracker for LoginSessions {
    fn user_state(&self, uid: u32) -> Option<SessionState> {
        let path = self.users_dir.join(uid.to_string());
        match fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .find_map(|line| line.strip_prefix("STATE="))
                .and_then(SessionState::parse),
            Err(error) => {
                if error.kind() != io::ErrorKind::NotFound {
                    tracing::debug!(target: "sysdeploy::session", %path, %error, "session state unreadable");
                }
                None
            }
        }
    }
}

/// Real user id of the calling process.
pub(crate) fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

/// Effective user id of the calling process.
pub(crate) fn effective_uid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

/// Decides whether registering as a client can succeed for `uid`.
pub(crate) fn registration_allowed(uid: u32, tracker: &dyn SessionTracker) -> bool {
    uid == 0 || tracker.user_state(uid) == Some(SessionState::Active)
}
