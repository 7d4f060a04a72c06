use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Output formats for client diagnostics on stderr.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// Single-line human-readable records. Interactive sessions use this.
    #[default]
    Compact,
    /// One JSON object per record, for collection by a journal or agent.
    Json,
}

/// Errors encountered while parsing a [`LogFormat`] from text.
pub type LogFormatParseError = strum::ParseError;
