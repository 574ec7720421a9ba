//! Engine: ties the countdown, rule table, counters and dispatcher together
//!
//! Each check runs on the calling thread and blocks until any pause or
//! prompt is over. Nothing that goes wrong during a check escapes it: the
//! worst outcome is that no action is taken.

use crate::callsite::CallSite;
use crate::counters::{CounterBackend, CounterStore};
use crate::countdown::{CountdownTick, GlobalCountdown};
use crate::dispatch::{
    AuditLog, CommandDialog, DebugHook, DebuggerCommand, Dialog, DispatchOutcome, Dispatcher,
    FileAuditLog, NullAuditLog, StdTerminal, StdinPause, Terminal,
};
use crate::error::{BreakchoiceError, Result};
use crate::policy::{Decision, Match, PolicyEngine, SuppressReason};
use crate::rules::RuleTable;
use crate::settings::Settings;
use std::sync::{Mutex, PoisonError};

/// What a single check did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The global countdown ran out and paused
    Countdown,
    /// A rule fired
    Fired {
        decision: Decision,
        dispatch: DispatchOutcome,
    },
    /// Nothing happened
    Suppressed { reason: SuppressReason },
}

impl Outcome {
    /// Whether an interactive action was attempted.
    pub fn fired(&self) -> bool {
        !matches!(self, Self::Suppressed { .. })
    }
}

/// The conditional breakpoint engine.
pub struct Engine {
    rules: RuleTable,
    counters: CounterStore,
    countdown: GlobalCountdown,
    dispatcher: Dispatcher,
    audit: Box<dyn AuditLog + Send>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("rules", &self.rules)
            .field("counters", &self.counters)
            .field("countdown", &self.countdown)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder(rules: RuleTable) -> EngineBuilder {
        EngineBuilder::new(rules)
    }

    /// Engine whose every check is NEVER, with no persistence.
    pub fn inert() -> Self {
        Self::builder(RuleTable::never()).build()
    }

    /// Build from settings: load rules, open the state file and call log,
    /// and set up the configured debugger and dialog commands.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let rules = settings.load_rules()?;
        let mut builder = Self::builder(rules)
            .counters(CounterStore::file(&settings.state_file))
            .countdown(settings.call_count);

        if let Some(command) = &settings.debugger_command {
            builder = builder.debugger(DebuggerCommand::parse(command)?);
        }
        if let Some(command) = &settings.dialog_command {
            builder = builder.dialog(CommandDialog::parse(command)?);
        }
        if let Some(path) = &settings.call_log {
            builder = builder.audit_log(FileAuditLog::new(path));
        }

        tracing::debug!(
            rules = builder.rules.len(),
            state_file = %settings.state_file.display(),
            call_count = ?settings.call_count,
            "engine configured"
        );
        Ok(builder.build())
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn counters_mut(&mut self) -> &mut CounterStore {
        &mut self.counters
    }

    pub fn countdown(&self) -> &GlobalCountdown {
        &self.countdown
    }

    /// Which rule would apply to `site`, without touching any state.
    pub fn explain(&self, site: &CallSite) -> Option<Match> {
        PolicyEngine::lookup(&self.rules, &site.lookup_keys())
    }

    /// Check `site` and pause or prompt if a rule says so.
    pub fn check(&mut self, site: &CallSite) -> Outcome {
        match self.countdown.tick() {
            CountdownTick::Fire => {
                tracing::info!(file = %site.file.display(), line = site.line, "call count reached");
                self.dispatcher.pause(site);
                return Outcome::Countdown;
            }
            CountdownTick::Counting { remaining } => {
                tracing::debug!(remaining, "call countdown");
            }
            CountdownTick::Inactive => {}
        }

        let entry = format!("{} {}", chrono::Utc::now().to_rfc3339(), site.audit_entry());
        if let Err(e) = self.audit.append(&entry) {
            tracing::warn!(error = %e, "failed to record call");
        }

        let keys = site.lookup_keys();
        tracing::debug!(?keys, "looking up call site");
        let decision = PolicyEngine::evaluate(&self.rules, &mut self.counters, &keys);
        match &decision {
            Decision::Suppress { reason } => Outcome::Suppressed { reason: *reason },
            Decision::Fire { key, action } => {
                let dispatch = self
                    .dispatcher
                    .dispatch(*action, key, site, &mut self.counters);
                Outcome::Fired {
                    decision: decision.clone(),
                    dispatch,
                }
            }
        }
    }
}

/// Builder for [`Engine`]; unset parts get the interactive defaults.
pub struct EngineBuilder {
    rules: RuleTable,
    counters: Option<CounterStore>,
    countdown: Option<u64>,
    debugger: Option<Box<dyn DebugHook + Send>>,
    dialog: Option<Box<dyn Dialog + Send>>,
    terminal: Option<Box<dyn Terminal + Send>>,
    audit: Option<Box<dyn AuditLog + Send>>,
}

impl EngineBuilder {
    pub fn new(rules: RuleTable) -> Self {
        Self {
            rules,
            counters: None,
            countdown: None,
            debugger: None,
            dialog: None,
            terminal: None,
            audit: None,
        }
    }

    pub fn counters(mut self, counters: CounterStore) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn counter_backend(self, backend: impl CounterBackend + Send + 'static) -> Self {
        self.counters(CounterStore::new(backend))
    }

    pub fn countdown(mut self, initial: Option<u64>) -> Self {
        self.countdown = initial;
        self
    }

    pub fn debugger(mut self, hook: impl DebugHook + Send + 'static) -> Self {
        self.debugger = Some(Box::new(hook));
        self
    }

    pub fn dialog(mut self, dialog: impl Dialog + Send + 'static) -> Self {
        self.dialog = Some(Box::new(dialog));
        self
    }

    pub fn terminal(mut self, terminal: impl Terminal + Send + 'static) -> Self {
        self.terminal = Some(Box::new(terminal));
        self
    }

    pub fn audit_log(mut self, audit: impl AuditLog + Send + 'static) -> Self {
        self.audit = Some(Box::new(audit));
        self
    }

    pub fn build(self) -> Engine {
        let dispatcher = Dispatcher::from_boxed(
            self.debugger.unwrap_or_else(|| Box::new(StdinPause)),
            self.dialog.unwrap_or_else(|| Box::new(CommandDialog::default())),
            self.terminal.unwrap_or_else(|| Box::new(StdTerminal)),
        );
        Engine {
            rules: self.rules,
            counters: self.counters.unwrap_or_else(CounterStore::in_memory),
            countdown: GlobalCountdown::new(self.countdown),
            dispatcher,
            audit: self.audit.unwrap_or_else(|| Box::new(NullAuditLog)),
        }
    }
}

// ---------------------------------------------------------------------------
// Process-wide engine
// ---------------------------------------------------------------------------

static GLOBAL: Mutex<Option<Engine>> = Mutex::new(None);

/// Install `engine` as the process-wide engine used by `breakpoint!()`,
/// returning the previous one.
pub fn install(engine: Engine) -> Option<Engine> {
    let mut guard = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
    guard.replace(engine)
}

/// Remove the process-wide engine.
pub fn uninstall() -> Option<Engine> {
    GLOBAL.lock().unwrap_or_else(PoisonError::into_inner).take()
}

/// Run `f` against the process-wide engine, configuring it from the
/// environment on first use. A broken configuration is logged and replaced
/// by an inert engine so the host program keeps running.
pub fn with_global<R>(f: impl FnOnce(&mut Engine) -> R) -> R {
    let mut guard = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
    let engine = guard.get_or_insert_with(|| {
        let configured = Settings::from_env()
            .map_err(BreakchoiceError::from)
            .and_then(|settings| Engine::from_settings(&settings));
        configured.unwrap_or_else(|e| {
            tracing::error!(error = %e, "breakchoice configuration invalid, breakpoints disabled");
            Engine::inert()
        })
    });
    f(engine)
}

/// Check `site` against the process-wide engine.
pub fn check_global(site: &CallSite) -> Outcome {
    with_global(|engine| engine.check(site))
}
