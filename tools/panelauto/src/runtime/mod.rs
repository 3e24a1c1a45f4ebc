use crate::errors::PanelAutoError;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, PanelAutoError>;
    fn write_string(&self, path: &Path, contents: &str) -> Result<(), PanelAutoError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), PanelAutoError>;
}

pub trait Terminal: Send + Sync {
    fn write_line(&self, line: &str) -> Result<(), PanelAutoError>;
    /// Show `prompt` and block until the operator submits a line.
    fn read_line(&self, prompt: &str) -> Result<String, PanelAutoError>;
    /// Like `read_line`, without echoing the typed text.
    fn read_secret(&self, prompt: &str) -> Result<String, PanelAutoError>;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, PanelAutoError> {
        std::fs::read_to_string(path)
            .map_err(|e| PanelAutoError::Io(format!("{}: {e}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), PanelAutoError> {
        std::fs::write(path, contents)
            .map_err(|e| PanelAutoError::Io(format!("{}: {e}", path.display())))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), PanelAutoError> {
        std::fs::create_dir_all(path).map_err(|e| PanelAutoError::Io(e.to_string()))
    }
}

pub struct ProductionTerminal;

impl Terminal for ProductionTerminal {
    fn write_line(&self, line: &str) -> Result<(), PanelAutoError> {
        use std::io::Write;
        let mut out = std::io::stdout();
        writeln!(out, "{line}").map_err(|e| PanelAutoError::Io(e.to_string()))
    }

    fn read_line(&self, prompt: &str) -> Result<String, PanelAutoError> {
        use std::io::{BufRead, Write};
        let mut out = std::io::stdout();
        write!(out, "{prompt}")
            .and_then(|_| out.flush())
            .map_err(|e| PanelAutoError::Io(e.to_string()))?;
        let mut line = String::new();
        let read = std::io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| PanelAutoError::Io(e.to_string()))?;
        if read == 0 {
            return Err(PanelAutoError::Io("stdin closed".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_secret(&self, prompt: &str) -> Result<String, PanelAutoError> {
        dialoguer::Password::new()
            .with_prompt(prompt.trim_end().trim_end_matches(':'))
            .allow_empty_password(true)
            .interact()
            .map_err(|e| PanelAutoError::Io(e.to_string()))
    }
}

pub struct ProductionRuntime {
    pub file_system: Arc<dyn FileSystem>,
    pub terminal: Arc<dyn Terminal>,
}

impl ProductionRuntime {
    pub fn new() -> Self {
        Self {
            file_system: Arc::new(ProductionFileSystem),
            terminal: Arc::new(ProductionTerminal),
        }
    }
}

impl Default for ProductionRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<PanelAutoError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        fs.files
            .lock()
            .expect("files lock")
            .insert(path.into(), contents.into());
        fs
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        self.dirs.lock().expect("dirs lock").clone()
    }

    pub fn set_fail_next(&self, error: PanelAutoError) {
        *self.fail_next.lock().expect("fail lock") = Some(error);
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files
            .lock()
            .expect("files lock")
            .get(path.as_ref())
            .cloned()
    }

    fn maybe_fail(&self) -> Result<(), PanelAutoError> {
        if let Some(err) = self.fail_next.lock().expect("fail lock").take() {
            return Err(err);
        }
        Ok(())
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, PanelAutoError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .get(path)
            .cloned()
            .ok_or_else(|| PanelAutoError::Io(format!("missing file {}", path.display())))
    }

    fn write_string(&self, path: &Path, contents: &str) -> Result<(), PanelAutoError> {
        self.maybe_fail()?;
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), PanelAutoError> {
        self.maybe_fail()?;
        self.dirs
            .lock()
            .expect("dirs lock")
            .push(path.to_path_buf());
        Ok(())
    }
}

/// One interaction seen by `FakeTerminal`, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalEvent {
    Prompt(String),
    SecretPrompt(String),
    Line(String),
}

/// Terminal double that answers prompts from a queue and records everything.
///
/// An exhausted queue reads as a closed stdin.
#[derive(Default, Clone)]
pub struct FakeTerminal {
    inputs: Arc<Mutex<VecDeque<String>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    secret_prompts: Arc<Mutex<Vec<String>>>,
    writes: Arc<Mutex<Vec<String>>>,
    transcript: Arc<Mutex<Vec<TerminalEvent>>>,
}

impl FakeTerminal {
    pub fn with_inputs<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let terminal = Self::default();
        for input in inputs {
            terminal.push_input(input);
        }
        terminal
    }

    pub fn push_input(&self, input: impl Into<String>) {
        self.inputs
            .lock()
            .expect("inputs lock")
            .push_back(input.into());
    }

    /// Every prompt shown, masked or not, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    pub fn secret_prompts(&self) -> Vec<String> {
        self.secret_prompts.lock().expect("secret prompts lock").clone()
    }

    pub fn written_lines(&self) -> Vec<String> {
        self.writes.lock().expect("writes lock").clone()
    }

    pub fn transcript(&self) -> Vec<TerminalEvent> {
        self.transcript.lock().expect("transcript lock").clone()
    }

    pub fn remaining_inputs(&self) -> usize {
        self.inputs.lock().expect("inputs lock").len()
    }

    fn note(&self, event: TerminalEvent) {
        self.transcript.lock().expect("transcript lock").push(event);
    }

    fn next_input(&self) -> Result<String, PanelAutoError> {
        self.inputs
            .lock()
            .expect("inputs lock")
            .pop_front()
            .ok_or_else(|| PanelAutoError::Io("stdin closed".to_string()))
    }
}

impl Terminal for FakeTerminal {
    fn write_line(&self, line: &str) -> Result<(), PanelAutoError> {
        self.writes
            .lock()
            .expect("writes lock")
            .push(line.to_string());
        self.note(TerminalEvent::Line(line.to_string()));
        Ok(())
    }

    fn read_line(&self, prompt: &str) -> Result<String, PanelAutoError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        self.note(TerminalEvent::Prompt(prompt.to_string()));
        self.next_input()
    }

    fn read_secret(&self, prompt: &str) -> Result<String, PanelAutoError> {
        self.prompts
            .lock()
            .expect("prompts lock")
            .push(prompt.to_string());
        self.secret_prompts
            .lock()
            .expect("secret prompts lock")
            .push(prompt.to_string());
        self.note(TerminalEvent::SecretPrompt(prompt.to_string()));
        self.next_input()
    }
}
