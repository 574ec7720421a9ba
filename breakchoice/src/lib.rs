//! Rule-driven conditional breakpoints
//!
//! Drop `breakpoint!()` into code under investigation. Each time it runs the
//! call site is resolved into lookup keys (`file:line`, `module.function`,
//! whole module, ...), the most specific matching rule is found, and the
//! rule's mode decides whether to pause into a debugger hook or prompt the
//! operator.
//!
//! # Modes
//! - `NEVER` / `ALWAYS`: stateless
//! - `FIRST`: fire once per key, ever
//! - `AFTER_N`: fire from the Nth hit on
//! - `EVERY_N`: fire when a countdown from N reaches zero
//!
//! # Actions
//! - `TRACE`: pause into the debugger hook
//! - `XPROMPT`: desktop dialog
//! - `PROMPT`: terminal prompt
//!
//! Counters survive restarts in a small state file, so `FIRST` means first
//! across runs, not per process.
//!
//! # Usage
//!
//! ```rust,ignore
//! use breakchoice::{breakpoint, Engine, Settings};
//!
//! let settings = Settings::from_env()?;
//! breakchoice::logging::init(&settings);
//! breakchoice::install(Engine::from_settings(&settings)?);
//!
//! fn flush() {
//!     breakpoint!();
//! }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod callsite;
pub mod countdown;
pub mod counters;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod logging;
pub mod policy;
pub mod rules;
pub mod settings;

pub use callsite::CallSite;
pub use countdown::{CountdownTick, GlobalCountdown};
pub use counters::{CounterBackend, CounterStore, MemoryBackend, TextFileBackend};
pub use dispatch::{
    AuditLog, CommandDialog, DebugHook, DebuggerCommand, Dialog, DispatchOutcome, Dispatcher,
    FileAuditLog, NullAuditLog, StdTerminal, StdinPause, Terminal,
};
pub use engine::{check_global, install, uninstall, with_global, Engine, EngineBuilder, Outcome};
pub use error::{BreakchoiceError, ConfigError, CounterError, DispatchError, Result};
pub use policy::{Decision, Match, PolicyEngine, SuppressReason};
pub use rules::{Action, BehaviorSpec, Literal, LookupKey, Mode, ResolvedRule, RuleTable, Trigger};
pub use settings::Settings;
