//! Refreshing the daemon's published state after a transaction.

use std::time::Duration;

use sysdeploy_daemon_types::{CachedUpdate, Deployment};
use tracing::debug;

use crate::bus::{BusError, DaemonBus};

/// Deployment state read after a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DeploymentSnapshot {
    pub(crate) deployments: Vec<Deployment>,
    pub(crate) cached_update: Option<CachedUpdate>,
}

impl DeploymentSnapshot {
    /// The deployment that boots next. The daemon lists it first.
    pub(crate) fn default_deployment(&self) -> Option<&Deployment> {
        self.deployments.first()
    }

    pub(crate) fn booted(&self) -> Option<&Deployment> {
        self.deployments.iter().find(|deployment| deployment.booted)
    }

    /// `true` when the default deployment differs from `previous`.
    pub(crate) fn has_new_default(&self, previous: Option<&Deployment>) -> bool {
        match (self.default_deployment(), previous) {
            (Some(current), Some(previous)) => !current.same_as(previous),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// `true` when the next boot will not use the booted deployment.
    pub(crate) fn reboot_pending(&self) -> bool {
        match (self.default_deployment(), self.booted()) {
            (Some(default), Some(booted)) => !default.same_as(booted),
            (Some(default), None) => default.staged,
            (None, _) => false,
        }
    }
}

/// Asks the daemon to reload, waits at most `timeout`, then reads back the
/// deployment list and cached update.
pub(crate) fn reconcile(
    bus: &mut dyn DaemonBus,
    timeout: Duration,
) -> Result<DeploymentSnapshot, BusError> {
    bus.reload(timeout)?;
    let deployments = bus.deployments()?;
    let cached_update = bus.cached_update()?;
    debug!(
        target: "sysdeploy::reconcile",
        deployments = deployments.len(),
        cached_update = cached_update.is_some(),
        "daemon state reloaded"
    );
    Ok(DeploymentSnapshot {
        deployments,
        cached_update,
    })
}
