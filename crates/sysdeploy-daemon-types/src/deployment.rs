//! Deployment records and the operations that change them.

use serde::{Deserialize, Serialize};

/// One bootable deployment known to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Stable identifier, unique across the deployment list.
    pub id: String,
    /// Operating system name the deployment belongs to.
    pub osname: String,
    /// Commit checksum of the deployed tree.
    pub checksum: String,
    /// Human-facing version string, when the commit carries one.
    #[serde(default)]
    pub version: Option<String>,
    /// Refspec or container reference the deployment tracks.
    pub origin: String,
    /// Deployment serial; distinguishes redeployments of one checksum.
    #[serde(default)]
    pub serial: u32,
    /// Whether this deployment is the one currently booted.
    #[serde(default)]
    pub booted: bool,
    /// Whether the deployment is staged for finalisation at shutdown.
    #[serde(default)]
    pub staged: bool,
    /// Whether the deployment is pinned against garbage collection.
    #[serde(default)]
    pub pinned: bool,
}

impl Deployment {
    /// Returns `true` when `other` describes the same deployment.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.id == other.id && self.checksum == other.checksum && self.serial == other.serial
    }
}

/// Result of the most recent update check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedUpdate {
    /// Origin the check was made against.
    pub origin: String,
    /// Checksum of the available commit.
    pub checksum: String,
    /// Version of the available commit, when known.
    #[serde(default)]
    pub version: Option<String>,
}

/// Cached or pending state removed by a cleanup operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTarget {
    /// Temporary files and unreferenced objects.
    Base,
    /// The pending deployment.
    Pending,
    /// The rollback deployment.
    Rollback,
    /// Cached repository metadata.
    Metadata,
}

/// State-changing operations a client may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    /// Upgrade to the latest commit on the current origin.
    Upgrade {
        /// Only check for an update and cache its metadata.
        #[serde(default)]
        check_only: bool,
    },
    /// Deploy a specific revision of the current origin.
    Deploy {
        /// Commit checksum or version to deploy.
        revision: String,
    },
    /// Switch to a different origin.
    Rebase {
        /// New refspec or container reference.
        refspec: String,
        /// Optional revision on the new origin.
        #[serde(default)]
        revision: Option<String>,
    },
    /// Make the previous deployment the default again.
    Rollback,
    /// Remove cached or pending state.
    Cleanup {
        /// What to clean up.
        targets: Vec<CleanupTarget>,
    },
    /// Download fresh repository metadata.
    RefreshMetadata {
        /// Refresh even when the cache looks current.
        #[serde(default)]
        force: bool,
    },
    /// Replace base packages with local or remote builds.
    OverrideReplace {
        /// Packages to substitute.
        packages: Vec<String>,
    },
    /// Remove packages from the base layer.
    OverrideRemove {
        /// Packages to remove.
        packages: Vec<String>,
    },
    /// Drop existing overrides.
    OverrideReset {
        /// Overrides to drop; ignored when `all` is set.
        packages: Vec<String>,
        /// Drop every override.
        #[serde(default)]
        all: bool,
    },
}

/// Options accepted alongside every [`Operation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// Reboot once the new deployment is ready.
    pub reboot: bool,
    /// Resolve and report changes without writing a deployment.
    pub dry_run: bool,
    /// Stop after downloading.
    pub download_only: bool,
    /// Do not contact remotes; use cached data only.
    pub cache_only: bool,
    /// Packages to layer on top of the new deployment.
    pub install: Vec<String>,
    /// Layered packages to remove from the new deployment.
    pub uninstall: Vec<String>,
    /// Shell-quoted command line that started the transaction.
    pub initiating_command_line: String,
}
