//! Output for each subcommand, written to any `io::Write` so it can be tested.

use anyhow::{bail, Result};
use breakchoice::{BehaviorSpec, CallSite, CounterStore, PolicyEngine, RuleTable};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct RuleRow<'a> {
    pattern: &'a str,
    spec: &'a BehaviorSpec,
    resolved: Option<String>,
}

pub fn print_rules(out: &mut impl Write, table: &RuleTable) -> Result<()> {
    for (pattern, spec) in table.iter() {
        let resolved = spec
            .resolve()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "?".into());
        writeln!(out, "{pattern}\t{spec}\t{resolved}")?;
    }
    match table.default_rule() {
        Some(spec) => {
            let resolved = spec
                .resolve()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "?".into());
            writeln!(out, "<default>\t{spec}\t{resolved}")?;
        }
        None => writeln!(out, "<default>\tunset\tNEVER -> TRACE")?,
    }
    Ok(())
}

/// Rule table as a JSON array, the default rule last under `<default>`.
pub fn print_rules_json(out: &mut impl Write, table: &RuleTable) -> Result<()> {
    let mut rows: Vec<RuleRow<'_>> = table
        .iter()
        .map(|(pattern, spec)| RuleRow {
            pattern,
            spec,
            resolved: spec.resolve().map(|r| r.to_string()),
        })
        .collect();
    if let Some(spec) = table.default_rule() {
        rows.push(RuleRow {
            pattern: "<default>",
            spec,
            resolved: spec.resolve().map(|r| r.to_string()),
        });
    }
    serde_json::to_writer_pretty(&mut *out, &rows)?;
    writeln!(out)?;
    Ok(())
}

pub fn print_keys(out: &mut impl Write, site: &CallSite) -> Result<()> {
    for (i, key) in site.lookup_keys().iter().enumerate() {
        writeln!(out, "{:>2}  {}", i + 1, key)?;
    }
    Ok(())
}

pub fn explain(
    out: &mut impl Write,
    table: &RuleTable,
    counters: &mut CounterStore,
    site: &CallSite,
) -> Result<()> {
    let keys = site.lookup_keys();
    match PolicyEngine::lookup(table, &keys) {
        Some(found) => {
            writeln!(out, "matched   {} (key #{})", found.key, found.index + 1)?;
            writeln!(out, "rule      {}", found.rule)?;
            match counters.get(found.key.counter_key()) {
                Some(value) => writeln!(out, "counter   {value}")?,
                None => writeln!(out, "counter   unset")?,
            }
        }
        None => writeln!(out, "no matching rule; implicit NEVER")?,
    }
    Ok(())
}

pub fn print_counters(out: &mut impl Write, counters: &mut CounterStore) -> Result<()> {
    for (key, value) in counters.snapshot() {
        writeln!(out, "{key}\t{value}")?;
    }
    Ok(())
}

pub fn reset_counters(
    out: &mut impl Write,
    counters: &mut CounterStore,
    key: Option<&str>,
    all: bool,
) -> Result<()> {
    match (key, all) {
        (_, true) => {
            let count = counters.snapshot().len();
            counters.clear();
            writeln!(out, "removed {count} counters")?;
        }
        (Some(key), false) => match counters.remove(key) {
            Some(value) => writeln!(out, "removed {key} (was {value})")?,
            None => bail!("no counter for {key:?}"),
        },
        (None, false) => bail!("give a counter key or --all"),
    }
    Ok(())
}
