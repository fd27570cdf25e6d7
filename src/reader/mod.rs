// Card reader capability.
//
// The engine only needs "wait up to a timeout for a card". Concrete readers
// wrap a probe helper program (PC/SC, nfcpy, vendor tools) or a keyboard-wedge
// device that types identifiers as lines on stdin.

mod command;
mod line;
#[cfg(test)]
pub mod scripted;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::{ReaderKind, ReaderSettings};
use crate::error::{ConfigError, ReaderError};

pub use command::CommandReader;
pub use line::LineReader;

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// A card was presented; the identifier is already normalized
    Card(String),
    /// Nothing presented before the timeout
    NoCard,
}

#[async_trait]
pub trait CardReader: Send {
    /// Wait at most `timeout` for a card.
    ///
    /// Timing out is `Ok(Probe::NoCard)`, never an error.
    async fn probe(&mut self, timeout: Duration) -> Result<Probe, ReaderError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// Build the reader selected in the configuration
pub fn from_settings(settings: &ReaderSettings) -> Result<Box<dyn CardReader>, ConfigError> {
    match settings.kind {
        ReaderKind::Command => {
            let program = settings.command.clone().ok_or_else(|| {
                ConfigError::Invalid("[reader] kind = \"command\" requires `command`".to_string())
            })?;
            Ok(Box::new(CommandReader::new(program, settings.args.clone())))
        }
        ReaderKind::Stdin => Ok(Box::new(LineReader::stdin())),
    }
}

/// Interpret raw probe output: first non-empty line is the identifier
pub(crate) fn parse_probe_output(output: &str) -> Result<Probe, ReaderError> {
    match output.lines().map(str::trim).find(|line| !line.is_empty()) {
        None => Ok(Probe::NoCard),
        Some(line) => crate::store::normalize_identifier(line)
            .map(Probe::Card)
            .ok_or_else(|| ReaderError::Malformed(line.to_string())),
    }
}
