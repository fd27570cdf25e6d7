use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{CardReader, Probe, parse_probe_output};
use crate::error::ReaderError;

/// Reader backed by an external probe program.
///
/// The program is run once per probe and should print the card identifier
/// (hex, any spacing) on stdout, or nothing if no card is present. A non-zero
/// exit status means the reader hardware is unavailable. The child is killed
/// if it outlives the probe timeout.
pub struct CommandReader {
    program: String,
    args: Vec<String>,
}

impl CommandReader {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

#[async_trait]
impl CardReader for CommandReader {
    async fn probe(&mut self, timeout: Duration) -> Result<Probe, ReaderError> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ReaderError::Spawn {
                command: self.program.clone(),
                source,
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                tracing::trace!("Reader command timed out after {:?}", timeout);
                return Ok(Probe::NoCard);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReaderError::Unavailable(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            format!("command reader ({})", self.program)
        } else {
            format!("command reader ({} {})", self.program, self.args.join(" "))
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> CommandReader {
        CommandReader::new("sh".to_string(), vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn reads_identifier_from_stdout() {
        let mut reader = shell("echo 'f6 37 cf 05'");
        let probe = reader.probe(Duration::from_secs(5)).await.unwrap();
        assert_eq!(probe, Probe::Card("F637CF05".to_string()));
    }

    #[tokio::test]
    async fn silent_exit_means_no_card() {
        let mut reader = shell("true");
        assert_eq!(reader.probe(Duration::from_secs(5)).await.unwrap(), Probe::NoCard);
    }

    #[tokio::test]
    async fn failing_command_is_unavailable() {
        let mut reader = shell("echo 'no readers found' >&2; exit 3");
        let err = reader.probe(Duration::from_secs(5)).await.unwrap_err();
        match err {
            ReaderError::Unavailable(message) => assert!(message.contains("no readers found")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_command_times_out_as_no_card() {
        let mut reader = shell("sleep 10");
        let started = std::time::Instant::now();
        let probe = reader.probe(Duration::from_millis(200)).await.unwrap();
        assert_eq!(probe, Probe::NoCard);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let mut reader = CommandReader::new("/nonexistent/read-idm".to_string(), vec![]);
        let err = reader.probe(Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ReaderError::Spawn { .. }));
    }
}
