use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

use super::{CardReader, Probe, parse_probe_output};
use crate::error::ReaderError;

/// Reader for keyboard-wedge devices that type one identifier per line
pub struct LineReader<R> {
    lines: Lines<BufReader<R>>,
    source: &'static str,
}

impl LineReader<tokio::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin(), "stdin")
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(input: R, source: &'static str) -> Self {
        Self {
            lines: BufReader::new(input).lines(),
            source,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> CardReader for LineReader<R> {
    async fn probe(&mut self, timeout: Duration) -> Result<Probe, ReaderError> {
        // next_line is cancel safe, so a timeout never loses a partial line
        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => Ok(Probe::NoCard),
            Ok(Ok(Some(line))) => parse_probe_output(&line),
            Ok(Ok(None)) => Err(ReaderError::Unavailable(format!("{} closed", self.source))),
            Ok(Err(err)) => Err(ReaderError::Io(err)),
        }
    }

    fn describe(&self) -> String {
        format!("line reader ({})", self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn yields_one_card_per_line() {
        let input: &[u8] = b"f637cf05\n\n00000000\n";
        let mut reader = LineReader::new(input, "test");
        let timeout = Duration::from_secs(1);

        assert_eq!(reader.probe(timeout).await.unwrap(), Probe::Card("F637CF05".to_string()));
        assert_eq!(reader.probe(timeout).await.unwrap(), Probe::NoCard);
        assert_eq!(reader.probe(timeout).await.unwrap(), Probe::Card("00000000".to_string()));
        assert!(matches!(
            reader.probe(timeout).await,
            Err(ReaderError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn idle_input_times_out() {
        let (_writer, read_half) = tokio::io::duplex(64);
        let mut reader = LineReader::new(read_half, "duplex");
        let probe = reader.probe(Duration::from_millis(50)).await.unwrap();
        assert_eq!(probe, Probe::NoCard);
    }
}
