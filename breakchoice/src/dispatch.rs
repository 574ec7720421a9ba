//! Action Dispatcher and its interaction channels
//!
//! Once a rule fires, the dispatcher pauses into the debugger hook (TRACE),
//! asks through a desktop dialog (XPROMPT) or asks on the terminal (PROMPT).
//! The prompt channels remember the operator's last answer in the counter
//! store under the matched key. The remembered answer is bookkeeping only:
//! nothing reads it back to skip later prompts.

use crate::callsite::CallSite;
use crate::counters::CounterStore;
use crate::error::{ConfigError, DispatchError};
use crate::rules::{Action, LookupKey};
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Answer stored before the operator has ever been asked.
pub const DEFAULT_RESPONSE: i64 = 1;

/// Question asked by the XPROMPT dialog.
pub const DIALOG_PROMPT: &str = "Pause next time?";

/// Default desktop dialog command; its exit status is the answer. `{prompt}`
/// is replaced by the question.
pub const DEFAULT_DIALOG_COMMAND: &str = "zenity --question --text={prompt}";

/// Text shown by the terminal prompt.
pub const TERMINAL_PROMPT: &str =
    "Continue? (press Enter, or type anything then Enter to cancel prompting next time)";

/// Pauses the current thread into an interactive inspection session.
pub trait DebugHook {
    /// Block until the operator resumes.
    fn pause(&mut self, site: &CallSite) -> io::Result<()>;
}

/// Desktop yes/no confirmation, run as an external process.
pub trait Dialog {
    /// Returns the process exit status; its meaning is up to the dialog.
    fn ask_yes_no(&mut self, prompt: &str) -> io::Result<i32>;
}

/// Blocking line input from the controlling terminal.
pub trait Terminal {
    fn read_line(&mut self, prompt: &str) -> io::Result<String>;
}

/// Best-effort call log.
pub trait AuditLog {
    fn append(&mut self, entry: &str) -> io::Result<()>;
}

// ---------------------------------------------------------------------------
// Debugger hooks
// ---------------------------------------------------------------------------

/// Announce the stop on stderr and wait for Enter, leaving time to attach
/// a debugger to the printed pid.
#[derive(Debug, Default)]
pub struct StdinPause;

impl DebugHook for StdinPause {
    fn pause(&mut self, site: &CallSite) -> io::Result<()> {
        let mut stderr = io::stderr().lock();
        writeln!(
            stderr,
            "breakchoice: paused at {}:{} in {} (pid {}). Press Enter to continue.",
            site.file.display(),
            site.line,
            site.function,
            std::process::id()
        )?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(())
    }
}

/// Run a debugger attach command and wait for it to exit. `{pid}` in the
/// arguments is replaced by this process id.
#[derive(Debug, Clone)]
pub struct DebuggerCommand {
    argv: Vec<String>,
}

impl DebuggerCommand {
    /// Parse a shell-style command line, e.g. `gdb -p {pid}`.
    pub fn parse(command: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            argv: split_command(command)?,
        })
    }

    /// Arguments with `{pid}` substituted.
    pub fn argv(&self) -> Vec<String> {
        let pid = std::process::id().to_string();
        self.argv.iter().map(|a| a.replace("{pid}", &pid)).collect()
    }
}

impl DebugHook for DebuggerCommand {
    fn pause(&mut self, site: &CallSite) -> io::Result<()> {
        let argv = self.argv();
        let Some((program, args)) = argv.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty debugger command"));
        };
        tracing::info!(
            command = ?argv,
            file = %site.file.display(),
            line = site.line,
            "attaching debugger"
        );
        let status = Command::new(program).args(args).status()?;
        if !status.success() {
            tracing::warn!(%status, "debugger command exited unsuccessfully");
        }
        Ok(())
    }
}

fn split_command(command: &str) -> Result<Vec<String>, ConfigError> {
    match shlex::split(command) {
        Some(argv) if !argv.is_empty() => Ok(argv),
        _ => Err(ConfigError::InvalidCommand {
            command: command.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Dialog / terminal
// ---------------------------------------------------------------------------

/// Dialog backed by an external command such as zenity. `{prompt}` in the
/// arguments is replaced by the question being asked.
#[derive(Debug, Clone)]
pub struct CommandDialog {
    argv: Vec<String>,
}

impl CommandDialog {
    pub fn parse(command: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            argv: split_command(command)?,
        })
    }

    /// Arguments with `{prompt}` substituted.
    pub fn argv(&self, prompt: &str) -> Vec<String> {
        self.argv.iter().map(|a| a.replace("{prompt}", prompt)).collect()
    }
}

impl Default for CommandDialog {
    fn default() -> Self {
        Self {
            argv: shlex::split(DEFAULT_DIALOG_COMMAND).unwrap_or_default(),
        }
    }
}

impl Dialog for CommandDialog {
    fn ask_yes_no(&mut self, prompt: &str) -> io::Result<i32> {
        let argv = self.argv(prompt);
        let Some((program, args)) = argv.split_first() else {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty dialog command"));
        };
        tracing::debug!(program = %program, prompt, "launching dialog");
        let status = Command::new(program).args(args).status()?;
        // Killed by a signal: no exit code, treat as "no".
        Ok(status.code().unwrap_or(-1))
    }
}

/// Prompt on stderr, read from stdin.
#[derive(Debug, Default)]
pub struct StdTerminal;

impl Terminal for StdTerminal {
    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        let mut stderr = io::stderr().lock();
        write!(stderr, "{prompt}")?;
        stderr.flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Map a terminal answer onto the counter domain: an empty line keeps
/// prompting (1), anything else asks to stop (0).
pub fn terminal_response(line: &str) -> i64 {
    if line.trim().is_empty() {
        1
    } else {
        0
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// Appends one line per call to a file, creating parent directories.
#[derive(Debug, Clone)]
pub struct FileAuditLog {
    path: PathBuf,
}

impl FileAuditLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditLog for FileAuditLog {
    fn append(&mut self, entry: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{entry}")
    }
}

/// Audit log that records nothing.
#[derive(Debug, Default)]
pub struct NullAuditLog;

impl AuditLog for NullAuditLog {
    fn append(&mut self, _entry: &str) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// What the dispatcher ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Debugger hook ran and returned
    Traced,
    /// Operator answered a prompt; the value stored for the key
    Prompted { response: i64 },
    /// Nothing happened (collaborator failure or unknown action)
    Skipped,
}

/// Owns the interaction channels.
pub struct Dispatcher {
    debugger: Box<dyn DebugHook + Send>,
    dialog: Box<dyn Dialog + Send>,
    terminal: Box<dyn Terminal + Send>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(StdinPause, CommandDialog::default(), StdTerminal)
    }
}

impl Dispatcher {
    pub fn new(
        debugger: impl DebugHook + Send + 'static,
        dialog: impl Dialog + Send + 'static,
        terminal: impl Terminal + Send + 'static,
    ) -> Self {
        Self::from_boxed(Box::new(debugger), Box::new(dialog), Box::new(terminal))
    }

    pub fn from_boxed(
        debugger: Box<dyn DebugHook + Send>,
        dialog: Box<dyn Dialog + Send>,
        terminal: Box<dyn Terminal + Send>,
    ) -> Self {
        Self {
            debugger,
            dialog,
            terminal,
        }
    }

    /// Run the debugger hook directly (used by the global countdown).
    pub fn pause(&mut self, site: &CallSite) -> DispatchOutcome {
        match self.debugger.pause(site) {
            Ok(()) => DispatchOutcome::Traced,
            Err(source) => {
                let err = DispatchError::Collaborator {
                    channel: "debugger",
                    source,
                };
                tracing::error!(error = %err, "trace failed");
                DispatchOutcome::Skipped
            }
        }
    }

    /// Perform `action` for a fired rule matched under `key`.
    pub fn dispatch(
        &mut self,
        action: Action,
        key: &LookupKey,
        site: &CallSite,
        counters: &mut CounterStore,
    ) -> DispatchOutcome {
        match action {
            Action::Trace => self.pause(site),
            Action::Xprompt => {
                let dialog = &mut self.dialog;
                Self::prompt(key, counters, "dialog", || {
                    dialog.ask_yes_no(DIALOG_PROMPT).map(i64::from)
                })
            }
            Action::Prompt => {
                let terminal = &mut self.terminal;
                Self::prompt(key, counters, "terminal", || {
                    terminal
                        .read_line(TERMINAL_PROMPT)
                        .map(|line| terminal_response(&line))
                })
            }
        }
    }

    /// Dispatch an action given by name, e.g. one read back from storage.
    pub fn dispatch_named(
        &mut self,
        action: &str,
        key: &LookupKey,
        site: &CallSite,
        counters: &mut CounterStore,
    ) -> DispatchOutcome {
        match action.parse::<Action>() {
            Ok(action) => self.dispatch(action, key, site, counters),
            Err(()) => {
                let err = DispatchError::UnknownAction(action.to_string());
                tracing::error!(error = %err, "not dispatching");
                DispatchOutcome::Skipped
            }
        }
    }

    fn prompt(
        key: &LookupKey,
        counters: &mut CounterStore,
        channel: &'static str,
        ask: impl FnOnce() -> io::Result<i64>,
    ) -> DispatchOutcome {
        let key = key.counter_key();
        let previous = counters.get_or_init(key, DEFAULT_RESPONSE);
        match ask() {
            Ok(response) => {
                if response != previous {
                    counters.set(key, response);
                }
                tracing::debug!(key, previous, response, channel, "prompt answered");
                DispatchOutcome::Prompted { response }
            }
            Err(source) => {
                let err = DispatchError::Collaborator { channel, source };
                tracing::error!(error = %err, "prompt failed");
                DispatchOutcome::Skipped
            }
        }
    }
}
