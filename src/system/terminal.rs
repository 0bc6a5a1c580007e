use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::sync::Mutex;

type LineSource = Lines<Box<dyn AsyncBufRead + Send + Unpin>>;

/// Line reader shared by every interactive prompt of the process.
///
/// A buffered reader pulls more than one line from a pipe, so two readers on
/// the same stdin would lose input to each other. Clones share one buffer.
#[derive(Clone)]
pub struct TerminalInput {
    lines: Arc<Mutex<LineSource>>,
}

impl TerminalInput {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
    {
        let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
        Self {
            lines: Arc::new(Mutex::new(reader.lines())),
        }
    }

    /// Next line without its terminator, `None` at end of input.
    pub async fn next_line(&self) -> std::io::Result<Option<String>> {
        self.lines.lock().await.next_line().await
    }

    /// Writes `prompt` to stderr and reads the answer.
    pub async fn prompt(&self, prompt: &str) -> std::io::Result<Option<String>> {
        let mut lines = self.lines.lock().await;
        let mut stderr = tokio::io::stderr();
        stderr.write_all(prompt.as_bytes()).await?;
        stderr.flush().await?;
        lines.next_line().await
    }
}
