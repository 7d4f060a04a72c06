//! Error types and diagnostics helpers for the CLI runtime.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::bus::{BusError, ConnectError};
use crate::locator::LocateError;
use crate::transaction::TransactionError;

/// Failures of the dispatcher itself, before or around a command.
#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("Unknown option '{0}'")]
    UnknownOption(String),
    #[error("No command specified")]
    NoCommand,
    #[error("Unknown command '{0}'")]
    UnknownCommand(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Failures raised while a command runs.
#[derive(Debug, Error)]
pub(crate) enum CommandError {
    #[error("{0}")]
    Usage(clap::Error),
    #[error("{0}")]
    Invalid(String),
    #[error("This command requires root privileges")]
    RequiresRoot,
    #[error("No subcommand specified")]
    NoSubcommand,
    #[error("Unknown \"{parent}\" subcommand '{name}'")]
    UnknownSubcommand { parent: &'static str, name: String },
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Transaction(#[from] TransactionError),
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error("failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

impl CommandError {
    /// `true` when the user cancelled the operation locally.
    pub(crate) const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transaction(TransactionError::Cancelled))
    }
}

impl AppError {
    pub(crate) const fn is_cancelled(&self) -> bool {
        match self {
            Self::Command(error) => error.is_cancelled(),
            _ => false,
        }
    }
}
