use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;

use super::{CardReader, Probe};
use crate::error::ReaderError;

/// In-memory reader that replays a fixed sequence of probe results,
/// then reports no card forever.
pub struct ScriptedReader {
    script: VecDeque<Result<Probe, ReaderError>>,
}

impl ScriptedReader {
    pub fn new(script: impl IntoIterator<Item = Result<Probe, ReaderError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    pub fn cards(identifiers: &[&str]) -> Self {
        Self::new(identifiers.iter().map(|id| Ok(Probe::Card(id.to_string()))))
    }
}

#[async_trait]
impl CardReader for ScriptedReader {
    async fn probe(&mut self, _timeout: Duration) -> Result<Probe, ReaderError> {
        self.script.pop_front().unwrap_or(Ok(Probe::NoCard))
    }

    fn describe(&self) -> String {
        "scripted reader".to_string()
    }
}
