use crate::runtime::Terminal;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub text: String,
    pub masked: bool,
}

impl PromptRequest {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            masked: false,
        }
    }

    pub fn masked(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            masked: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptFailure {
    Unavailable(String),
    TimedOut(Duration),
    Cancelled,
}

/// The only suspension point of a replay: blocks until an operator answers.
pub trait InputPrompt {
    fn request_input(&self, request: &PromptRequest) -> Result<String, PromptFailure>;
    fn emit_error(&self, title: &str, message: &str) -> Result<(), PromptFailure>;
}

/// Console prompt over the `Terminal` seam.
///
/// With a timeout set, the read runs on a helper thread while this thread
/// waits, polling the cancellation token. A read that loses the race is
/// abandoned and its answer discarded.
pub struct TerminalPrompt {
    terminal: Arc<dyn Terminal>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
}

impl TerminalPrompt {
    pub fn new(terminal: Arc<dyn Terminal>, cancel: CancellationToken) -> Self {
        Self {
            terminal,
            cancel,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn read(terminal: &dyn Terminal, request: &PromptRequest) -> Result<String, PromptFailure> {
        let answer = if request.masked {
            terminal.read_secret(&request.text)
        } else {
            terminal.read_line(&request.text)
        };
        answer.map_err(|e| PromptFailure::Unavailable(e.to_string()))
    }

    fn read_with_deadline(
        &self,
        request: &PromptRequest,
        timeout: Duration,
    ) -> Result<String, PromptFailure> {
        let (tx, rx) = mpsc::channel();
        let terminal = Arc::clone(&self.terminal);
        let request = request.clone();
        std::thread::Builder::new()
            .name("panelauto-prompt".to_string())
            .spawn(move || {
                let _ = tx.send(Self::read(terminal.as_ref(), &request));
            })
            .map_err(|e| PromptFailure::Unavailable(e.to_string()))?;

        let deadline = Instant::now() + timeout;
        loop {
            if self.cancel.is_cancelled() {
                return Err(PromptFailure::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PromptFailure::TimedOut(timeout));
            }
            match rx.recv_timeout(remaining.min(CANCEL_POLL_INTERVAL)) {
                Ok(answer) => return answer,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PromptFailure::Unavailable(
                        "prompt reader exited without an answer".to_string(),
                    ))
                }
            }
        }
    }
}

impl InputPrompt for TerminalPrompt {
    fn request_input(&self, request: &PromptRequest) -> Result<String, PromptFailure> {
        if self.cancel.is_cancelled() {
            return Err(PromptFailure::Cancelled);
        }
        match self.timeout {
            Some(timeout) => self.read_with_deadline(request, timeout),
            None => Self::read(self.terminal.as_ref(), request),
        }
    }

    fn emit_error(&self, title: &str, message: &str) -> Result<(), PromptFailure> {
        self.terminal
            .write_line(&format!("{title}: {message}"))
            .map_err(|e| PromptFailure::Unavailable(e.to_string()))
    }
}
