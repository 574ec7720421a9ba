//! Policy Engine: the per-site trigger state machine
//!
//! Finds the first rule matching a call site's lookup keys and runs the
//! rule's mode against the counter stored under the matched key.
//!
//! | Mode | Counter effect | Fires when |
//! |---|---|---|
//! | NEVER | none | never |
//! | ALWAYS | none | always |
//! | FIRST | set to 1 | counter was absent or not 1 |
//! | AFTER_N(n) | +1 (absent starts at 1) | counter >= n |
//! | EVERY_N(n) | absent: init n-1; else -1 | counter hits exactly 0 |
//!
//! EVERY_N never resets after reaching zero: the counter goes negative on
//! the next hit, so it fires once and then stays quiet.

use crate::counters::CounterStore;
use crate::rules::{Action, LookupKey, ResolvedRule, RuleTable, Trigger};
use std::fmt;

/// The rule chosen for a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Key the rule was found under
    pub key: LookupKey,
    /// Position of `key` in the probed list
    pub index: usize,
    pub rule: ResolvedRule,
}

/// Why a check did not fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    /// No key matched and there is no default rule
    NoRule,
    /// Matched rule is NEVER
    Never,
    /// FIRST already consumed
    AlreadyFired,
    /// AFTER_N below its threshold
    BelowThreshold,
    /// EVERY_N counter not at zero
    Waiting,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoRule => "no matching rule",
            Self::Never => "rule is NEVER",
            Self::AlreadyFired => "FIRST already fired",
            Self::BelowThreshold => "AFTER_N below threshold",
            Self::Waiting => "EVERY_N counting down",
        };
        f.write_str(s)
    }
}

/// Outcome of evaluating a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Fire { key: LookupKey, action: Action },
    Suppress { reason: SuppressReason },
}

impl Decision {
    pub fn fires(&self) -> bool {
        matches!(self, Self::Fire { .. })
    }

    fn suppress(reason: SuppressReason) -> Self {
        Self::Suppress { reason }
    }
}

/// Stateless evaluator; all state lives in the [`CounterStore`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    /// First key present in `table`, with its rule resolved.
    pub fn lookup(table: &RuleTable, keys: &[LookupKey]) -> Option<Match> {
        keys.iter().enumerate().find_map(|(index, key)| {
            let spec = table.get(key)?;
            tracing::trace!(%key, "checking");
            // Tables reject counting modes without a count, so this resolves.
            let rule = spec.resolve()?;
            Some(Match {
                key: key.clone(),
                index,
                rule,
            })
        })
    }

    /// Match and run the trigger state machine, updating counters.
    pub fn evaluate(
        table: &RuleTable,
        counters: &mut CounterStore,
        keys: &[LookupKey],
    ) -> Decision {
        let Some(found) = Self::lookup(table, keys) else {
            tracing::debug!("no matching rule and no default, ignoring");
            return Decision::suppress(SuppressReason::NoRule);
        };
        tracing::info!(key = %found.key, rule = %found.rule, "found behaviour for call site");
        Self::run_trigger(&found, counters)
    }

    /// Apply `found.rule` to the counter under `found.key`.
    pub fn run_trigger(found: &Match, counters: &mut CounterStore) -> Decision {
        let key = found.key.counter_key();
        let fire = Decision::Fire {
            key: found.key.clone(),
            action: found.rule.action,
        };

        match found.rule.trigger {
            Trigger::Never => Decision::suppress(SuppressReason::Never),
            Trigger::Always => fire,
            Trigger::First => {
                if counters.get(key) == Some(1) {
                    Decision::suppress(SuppressReason::AlreadyFired)
                } else {
                    counters.set(key, 1);
                    fire
                }
            }
            Trigger::AfterN(count) => {
                let hits = counters.increment(key);
                tracing::debug!(key, hits, count, "AFTER_N");
                if hits < count {
                    Decision::suppress(SuppressReason::BelowThreshold)
                } else {
                    fire
                }
            }
            Trigger::EveryN(count) => match counters.decrement(key) {
                None => {
                    counters.set(key, count.saturating_sub(1));
                    Decision::suppress(SuppressReason::Waiting)
                }
                Some(0) => fire,
                Some(remaining) => {
                    tracing::debug!(key, remaining, "EVERY_N");
                    Decision::suppress(SuppressReason::Waiting)
                }
            },
        }
    }
}
