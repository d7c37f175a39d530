//! Line input for the console: a small `Prompter` seam, the rustyline-backed
//! terminal implementation, and a scripted implementation for driving the
//! console without a terminal.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::path::PathBuf;

use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, ExternalPrinter, Helper};
use tracing::{debug, warn};

/// Words offered by tab completion at the start of a line.
pub const COMMAND_WORDS: &[&str] = &["help", "clear", "cls", "info", "user", "logout", "exit", "quit"];

/// Second words offered after `user `.
pub const USER_SUBCOMMANDS: &[&str] = &["create", "delete", "list", "update", "upgrade"];

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// Ctrl-C while reading.
    #[error("Operation cancelled")]
    Cancelled,
    /// Ctrl-D or closed input.
    #[error("end of input")]
    Eof,
    #[error("input error: {0}")]
    Io(String),
}

impl InputError {
    pub fn code_str(&self) -> &'static str {
        match self {
            InputError::Cancelled => "cancelled",
            InputError::Eof => "eof",
            InputError::Io(_) => "io",
        }
    }
}

impl From<ReadlineError> for InputError {
    fn from(e: ReadlineError) -> Self {
        match e {
            ReadlineError::Interrupted => InputError::Cancelled,
            ReadlineError::Eof => InputError::Eof,
            other => InputError::Io(other.to_string()),
        }
    }
}

pub trait Prompter {
    fn read_line(&mut self, prompt: &str) -> Result<String, InputError>;
    /// Like `read_line` but the typed text is not echoed and never reaches history.
    fn read_password(&mut self, prompt: &str) -> Result<String, InputError>;
    fn add_history(&mut self, _line: &str) {}
    fn clear_screen(&mut self) {}
}

/// Completion for command words plus masking for password entry.
#[derive(Default)]
pub struct ConsoleHelper {
    masking: bool,
}

impl Completer for ConsoleHelper {
    type Candidate = String;

    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> rustyline::Result<(usize, Vec<String>)> {
        if self.masking { return Ok((pos, Vec::new())); }
        Ok(complete_command(&line[..pos]))
    }
}

impl Hinter for ConsoleHelper {
    type Hint = String;
}

impl Highlighter for ConsoleHelper {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if self.masking { Cow::Owned("*".repeat(line.chars().count())) } else { Cow::Borrowed(line) }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool { self.masking }
}

impl Validator for ConsoleHelper {}

impl Helper for ConsoleHelper {}

/// Completion candidates for the text left of the cursor; returns the start
/// offset of the word being completed.
pub fn complete_command(before_cursor: &str) -> (usize, Vec<String>) {
    let start = before_cursor.rfind(' ').map(|i| i + 1).unwrap_or(0);
    let word = &before_cursor[start..];
    let head: Vec<&str> = before_cursor[..start].split_whitespace().collect();
    let pool: &[&str] = match head.as_slice() {
        [] => COMMAND_WORDS,
        ["user"] => USER_SUBCOMMANDS,
        _ => &[],
    };
    let matches = pool.iter().filter(|c| c.starts_with(word)).map(|c| c.to_string()).collect();
    (start, matches)
}

/// Terminal prompter over rustyline with a persisted command history.
pub struct RustylinePrompter {
    editor: Editor<ConsoleHelper, DefaultHistory>,
    history_path: Option<PathBuf>,
}

impl RustylinePrompter {
    pub fn new(history_path: Option<PathBuf>, history_limit: usize) -> Result<Self, InputError> {
        let config = rustyline::Config::builder()
            .auto_add_history(false)
            .max_history_size(history_limit.max(1))?
            .build();
        let mut editor = Editor::<ConsoleHelper, DefaultHistory>::with_config(config)?;
        editor.set_helper(Some(ConsoleHelper::default()));
        if let Some(path) = history_path.as_deref() {
            // Missing on first run.
            if let Err(e) = editor.load_history(path) { debug!("history.load path={} err={}", path.display(), e); }
        }
        Ok(Self { editor, history_path })
    }

    /// Printer that can write above the prompt from another thread.
    pub fn external_printer(&mut self) -> Option<Box<dyn ExternalPrinter + Send>> {
        self.editor
            .create_external_printer()
            .ok()
            .map(|p| Box::new(p) as Box<dyn ExternalPrinter + Send>)
    }

    pub fn save_history(&mut self) {
        if let Some(path) = self.history_path.as_deref() {
            if let Some(dir) = path.parent() { let _ = std::fs::create_dir_all(dir); }
            if let Err(e) = self.editor.save_history(path) { warn!("history.save path={} err={}", path.display(), e); }
        }
    }

    fn set_masking(&mut self, on: bool) {
        if let Some(h) = self.editor.helper_mut() { h.masking = on; }
    }
}

impl Prompter for RustylinePrompter {
    fn read_line(&mut self, prompt: &str) -> Result<String, InputError> { Ok(self.editor.readline(prompt)?) }

    fn read_password(&mut self, prompt: &str) -> Result<String, InputError> {
        self.set_masking(true);
        let res = self.editor.readline(prompt);
        self.set_masking(false);
        Ok(res?)
    }

    fn add_history(&mut self, line: &str) {
        if line.trim().is_empty() { return; }
        let _ = self.editor.add_history_entry(line);
        self.save_history();
    }

    fn clear_screen(&mut self) {
        if let Err(e) = self.editor.clear_screen() { debug!("clear_screen failed: {}", e); }
    }
}

impl Drop for RustylinePrompter {
    fn drop(&mut self) { self.save_history(); }
}

/// One scripted reply.
#[derive(Debug, Clone)]
enum Reply {
    Line(String),
    Interrupt,
}

/// Prompter that replays canned input; runs out as end-of-input.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    replies: VecDeque<Reply>,
    prompts: Vec<String>,
    history: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { replies: lines.into_iter().map(|l| Reply::Line(l.into())).collect(), ..Default::default() }
    }

    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.replies.push_back(Reply::Line(line.into()));
        self
    }

    /// Queue a Ctrl-C.
    pub fn interrupt(mut self) -> Self {
        self.replies.push_back(Reply::Interrupt);
        self
    }

    pub fn prompts(&self) -> &[String] { &self.prompts }

    pub fn history(&self) -> &[String] { &self.history }

    fn next(&mut self, prompt: &str) -> Result<String, InputError> {
        self.prompts.push(prompt.to_string());
        match self.replies.pop_front() {
            Some(Reply::Line(l)) => Ok(l),
            Some(Reply::Interrupt) => Err(InputError::Cancelled),
            None => Err(InputError::Eof),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn read_line(&mut self, prompt: &str) -> Result<String, InputError> { self.next(prompt) }

    fn read_password(&mut self, prompt: &str) -> Result<String, InputError> { self.next(prompt) }

    fn add_history(&mut self, line: &str) { self.history.push(line.to_string()); }
}
