//! Runtime settings for rules, counters and the call log
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `BC_CALL_COUNT` | unset | Pause unconditionally on the Nth check, ignoring rules until then |
//! | `BC_RULES` | first of `~/.config/breakchoice.cf`, `~/.breakchoice.cf`, `/etc/breakchoice.cf` | Rule document |
//! | `BC_STATEFILE` | `~/.local/var/breakchoice.state` | Counter store |
//! | `BC_LOG_CALLS` | `~/.local/var/breakchoice.log` | Call log; empty disables it |
//! | `BC_LOGLEVEL` | `info` | Log level or filter directive (`10`..`50` also accepted) |
//! | `BC_DEBUGGER` | unset | Debugger attach command, `{pid}` substituted; unset waits for Enter |
//! | `BC_XPROMPT` | `zenity --question ...` | Dialog command for XPROMPT |

use crate::error::ConfigError;
use crate::rules::RuleTable;
use std::path::PathBuf;

/// Candidate rule documents, in search order.
pub const RULE_FILE_CANDIDATES: [&str; 3] = [
    "~/.config/breakchoice.cf",
    "~/.breakchoice.cf",
    "/etc/breakchoice.cf",
];

pub const DEFAULT_STATE_FILE: &str = "~/.local/var/breakchoice.state";
pub const DEFAULT_CALL_LOG: &str = "~/.local/var/breakchoice.log";
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Resolved runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Rule document; `None` means every check is NEVER
    pub rules_file: Option<PathBuf>,
    pub state_file: PathBuf,
    /// Call log; `None` disables it
    pub call_log: Option<PathBuf>,
    pub call_count: Option<u64>,
    /// `tracing_subscriber` filter directive
    pub log_filter: String,
    pub debugger_command: Option<String>,
    pub dialog_command: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules_file: None,
            state_file: expand_home(DEFAULT_STATE_FILE),
            call_log: Some(expand_home(DEFAULT_CALL_LOG)),
            call_count: None,
            log_filter: DEFAULT_LOG_LEVEL.to_string(),
            debugger_command: None,
            dialog_command: None,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns a variable's value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let call_count = match lookup("BC_CALL_COUNT").filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
                variable: "BC_CALL_COUNT".into(),
                value: raw.clone(),
            })?),
            None => None,
        };

        let rules_file = match lookup("BC_RULES").filter(|v| !v.is_empty()) {
            Some(path) => Some(expand_home(&path)),
            None => find_rules_file(),
        };

        let state_file = lookup("BC_STATEFILE")
            .filter(|v| !v.is_empty())
            .map(|v| expand_home(&v))
            .unwrap_or_else(|| expand_home(DEFAULT_STATE_FILE));

        let call_log = match lookup("BC_LOG_CALLS") {
            Some(v) if v.is_empty() => None,
            Some(v) => Some(expand_home(&v)),
            None => Some(expand_home(DEFAULT_CALL_LOG)),
        };

        let log_filter = lookup("BC_LOGLEVEL")
            .map(|v| log_filter_from_level(&v))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            rules_file,
            state_file,
            call_log,
            call_count,
            log_filter,
            debugger_command: lookup("BC_DEBUGGER").filter(|v| !v.is_empty()),
            dialog_command: lookup("BC_XPROMPT").filter(|v| !v.is_empty()),
        })
    }

    /// Load the rule table; no rules file yields the NEVER table.
    pub fn load_rules(&self) -> Result<RuleTable, ConfigError> {
        match &self.rules_file {
            Some(path) => RuleTable::load(path),
            None => {
                tracing::debug!("no rules file, every check is NEVER");
                Ok(RuleTable::never())
            }
        }
    }
}

/// First existing rules file among [`RULE_FILE_CANDIDATES`].
pub fn find_rules_file() -> Option<PathBuf> {
    RULE_FILE_CANDIDATES
        .iter()
        .map(|p| expand_home(p))
        .find(|p| p.exists())
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}

/// Turn `BC_LOGLEVEL` into a filter directive. Numeric levels follow the
/// usual 10/20/30/40/50 scale; names pass through lower-cased.
pub fn log_filter_from_level(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return DEFAULT_LOG_LEVEL.to_string();
    }
    match value.parse::<u32>() {
        Ok(n) if n < 10 => "trace".into(),
        Ok(n) if n < 20 => "debug".into(),
        Ok(n) if n < 30 => "info".into(),
        Ok(n) if n < 40 => "warn".into(),
        Ok(_) => "error".into(),
        Err(_) => match value.to_ascii_lowercase().as_str() {
            "warning" => "warn".into(),
            "critical" | "fatal" => "error".into(),
            other => other.to_string(),
        },
    }
}
