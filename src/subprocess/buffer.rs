//! Per-invocation sink for the lines a subprocess writes
//!
//! A `LineBuffer` is the consumer half of one invocation's output channel plus
//! the lines retained from it so far. Lines arrive in the order the process
//! wrote them. Streaming consumers take lines with [`LineBuffer::next_line`];
//! synchronous callers drain everything with [`LineBuffer::fill`] and then use
//! the query helpers to look for sentinel phrases.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

#[derive(Debug)]
pub struct LineBuffer {
    rx: Option<mpsc::UnboundedReceiver<String>>,
    lines: Vec<String>,
}

impl LineBuffer {
    pub fn new(rx: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            rx: Some(rx),
            lines: Vec::new(),
        }
    }

    /// A closed buffer that already holds `lines`
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rx: None,
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Next line from the producer, or `None` once the channel has closed.
    ///
    /// Lines handed out here are not retained.
    pub async fn next_line(&mut self) -> Option<String> {
        let rx = self.rx.as_mut()?;
        match rx.recv().await {
            Some(line) => Some(line),
            None => {
                self.rx = None;
                None
            }
        }
    }

    /// Retain every line that has already arrived without waiting for more
    pub fn absorb_ready(&mut self) -> usize {
        let mut absorbed = 0;
        while let Some(rx) = self.rx.as_mut() {
            match rx.try_recv() {
                Ok(line) => {
                    self.lines.push(line);
                    absorbed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.rx = None,
            }
        }
        absorbed
    }

    /// Retain lines until the producer closes the channel
    pub async fn fill(&mut self) -> &[String] {
        while let Some(line) = self.next_line().await {
            self.lines.push(line);
        }
        &self.lines
    }

    /// True once the producer has closed the channel and it has been observed
    pub fn is_closed(&self) -> bool {
        self.rx.is_none()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Retained lines joined with newlines
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn contains_exact(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line == needle)
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.lines.iter().any(|line| line.starts_with(prefix))
    }

    pub fn contains_substring(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}
