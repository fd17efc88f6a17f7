//! Console stream inspection.
//!
//! Instance consoles arrive as a sequence of WebSocket frames whose
//! boundaries bear no relation to line boundaries. [`LineScanner`] reassembles
//! complete lines and [`wait_for_pattern`] drives a stream through it until a
//! line matches or the deadline passes.

mod transport;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use regex::Regex;
use thiserror::Error;
use tokio::time::{Instant, timeout_at};

pub use transport::{connect, insecure_client_config};

type Frames = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ConsoleError>> + Send>>;
type CloseFuture = Pin<Box<dyn Future<Output = Result<(), ConsoleError>> + Send>>;
type Closer = Box<dyn FnOnce() -> CloseFuture + Send>;

/// Raw console output of an instance, plus the connection it arrives on.
///
/// The stream yields the payload of each data frame. [`ConsoleStream::close`]
/// shuts the connection down; dropping the stream only abandons it.
pub struct ConsoleStream {
    frames: Frames,
    closer: Option<Closer>,
}

impl ConsoleStream {
    /// Wraps `frames` with nothing to close.
    #[must_use]
    pub fn new<S>(frames: S) -> Self
    where
        S: Stream<Item = Result<Vec<u8>, ConsoleError>> + Send + 'static,
    {
        Self {
            frames: Box::pin(frames),
            closer: None,
        }
    }

    /// Runs `close` the first time [`ConsoleStream::close`] is called.
    #[must_use]
    pub fn with_close<C, Fut>(mut self, close: C) -> Self
    where
        C: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), ConsoleError>> + Send + 'static,
    {
        self.closer = Some(Box::new(move || -> CloseFuture { Box::pin(close()) }));
        self
    }

    /// Closes the underlying connection. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ConsoleError::Transport`] when the close handshake cannot be
    /// sent.
    pub async fn close(&mut self) -> Result<(), ConsoleError> {
        let Some(close) = self.closer.take() else {
            return Ok(());
        };
        close().await
    }
}

impl Stream for ConsoleStream {
    type Item = Result<Vec<u8>, ConsoleError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.frames.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for ConsoleStream {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConsoleStream")
            .field("closable", &self.closer.is_some())
            .finish_non_exhaustive()
    }
}

/// Errors raised while reading an instance console.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConsoleError {
    /// Raised when the WebSocket handshake fails.
    #[error("failed to connect to console {url}: {message}")]
    Connect {
        /// Console URL.
        url: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the TLS client configuration cannot be built.
    #[error("failed to configure console TLS: {0}")]
    Tls(String),
    /// Raised when reading a frame fails.
    #[error("console transport error: {0}")]
    Transport(String),
    /// Raised when the stream ends before any line matched.
    #[error("console closed before a line matched `{pattern}`")]
    StreamClosed {
        /// Pattern being waited for.
        pattern: String,
    },
    /// Raised when the deadline passes before any line matched.
    #[error("timed out waiting for a console line matching `{pattern}`")]
    Timeout {
        /// Pattern being waited for.
        pattern: String,
    },
}

/// First console line that satisfied a pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PatternMatch {
    /// Complete line, without its terminator.
    pub line: String,
    /// Text matched by the whole pattern.
    pub matched: String,
    /// Capture groups in pattern order; `None` when a group did not take part.
    pub groups: Vec<Option<String>>,
}

/// Assembles newline-terminated lines from arbitrary chunks and tests each
/// one against a pattern.
///
/// Bytes are buffered rather than decoded per chunk, so a multi-byte
/// character split across frames is decoded intact. Text after the last
/// newline stays buffered until its terminator arrives.
#[derive(Debug)]
pub struct LineScanner {
    pattern: Regex,
    pending: Vec<u8>,
}

impl LineScanner {
    /// Creates a scanner for `pattern`.
    #[must_use]
    pub const fn new(pattern: Regex) -> Self {
        Self {
            pattern,
            pending: Vec::new(),
        }
    }

    /// Returns the pattern being scanned for.
    #[must_use]
    pub const fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Returns the bytes received after the last complete line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Feeds a chunk and returns the first newly completed line that matches.
    pub fn push(&mut self, chunk: &[u8]) -> Option<PatternMatch> {
        self.pending.extend_from_slice(chunk);

        while let Some(end) = self.pending.iter().position(|byte| *byte == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim_end_matches(['\n', '\r']);
            if let Some(found) = self.match_line(line) {
                return Some(found);
            }
        }

        None
    }

    fn match_line(&self, line: &str) -> Option<PatternMatch> {
        let captures = self.pattern.captures(line)?;
        let matched = captures
            .get(0)
            .map(|whole| whole.as_str().to_owned())
            .unwrap_or_default();
        let groups = captures
            .iter()
            .skip(1)
            .map(|group| group.map(|value| value.as_str().to_owned()))
            .collect();

        Some(PatternMatch {
            line: line.to_owned(),
            matched,
            groups,
        })
    }
}

/// Consumes `stream` until a complete line matches `pattern`.
///
/// # Errors
///
/// Returns [`ConsoleError::Timeout`] when `deadline` passes first,
/// [`ConsoleError::StreamClosed`] when the stream ends without a match, and
/// propagates transport errors yielded by the stream.
pub async fn wait_for_pattern<S>(
    stream: &mut S,
    pattern: &Regex,
    deadline: Instant,
) -> Result<PatternMatch, ConsoleError>
where
    S: Stream<Item = Result<Vec<u8>, ConsoleError>> + Unpin + ?Sized,
{
    let mut scanner = LineScanner::new(pattern.clone());

    loop {
        let next = timeout_at(deadline, stream.next())
            .await
            .map_err(|_| ConsoleError::Timeout {
                pattern: pattern.as_str().to_owned(),
            })?;

        match next {
            Some(Ok(chunk)) => {
                if let Some(found) = scanner.push(&chunk) {
                    return Ok(found);
                }
            }
            Some(Err(err)) => return Err(err),
            None => {
                return Err(ConsoleError::StreamClosed {
                    pattern: pattern.as_str().to_owned(),
                });
            }
        }
    }
}
