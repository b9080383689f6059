//! Line input shared by the REPL and the confirmation prompt.

use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

/// Handle to the one line reader of a session
pub type SharedInput = Arc<Mutex<LineInput>>;

pub struct LineInput {
    reader: Box<dyn AsyncBufRead + Send + Unpin>,
}

impl LineInput {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
        }
    }

    pub fn shared(self) -> SharedInput {
        Arc::new(Mutex::new(self))
    }

    /// Next line without its line ending, or `None` at end of input.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_lines_until_eof() {
        let mut input = LineInput::from_reader(&b"first\r\nsecond\nlast"[..]);

        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(input.read_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(input.read_line().await.unwrap(), None);
    }
}
