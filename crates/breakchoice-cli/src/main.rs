mod commands;

use anyhow::{Context, Result};
use breakchoice::Settings;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Inspect breakchoice rules, lookup keys and persisted counters.
#[derive(Parser, Debug)]
#[command(name = "breakchoice", version, about)]
struct Args {
    /// Rule document (overrides BC_RULES and the default search path)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    /// Counter state file (overrides BC_STATEFILE)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the normalized rule table
    Rules {
        /// Emit JSON instead of tab-separated text
        #[arg(long)]
        json: bool,
    },
    /// Print the lookup keys for a call site, most specific first
    Keys(SiteArgs),
    /// Show which rule a call site would match, without changing counters
    Explain(SiteArgs),
    /// List or reset persisted counters
    Counters {
        #[command(subcommand)]
        action: CountersAction,
    },
}

#[derive(Subcommand, Debug)]
enum CountersAction {
    /// Print every counter
    List,
    /// Remove one counter, or all of them with --all
    Reset {
        /// Pattern whose counter to remove
        key: Option<String>,
        #[arg(long, conflicts_with = "key")]
        all: bool,
    },
}

/// A call site given on the command line.
#[derive(clap::Args, Debug)]
struct SiteArgs {
    /// Source file of the call site
    #[arg(long)]
    file: PathBuf,
    /// Line number
    #[arg(long)]
    line: u32,
    /// Enclosing function name
    #[arg(long)]
    function: String,
    /// Rust module path, e.g. `app::net::conn`
    #[arg(long)]
    module_path: Option<String>,
}

impl SiteArgs {
    fn call_site(&self) -> breakchoice::CallSite {
        let site = breakchoice::CallSite::new(&self.file, self.line, &self.function);
        match &self.module_path {
            Some(path) => site.with_module_path(path),
            None => site,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = Settings::from_env().context("Invalid breakchoice environment")?;
    if let Some(rules) = args.rules {
        settings.rules_file = Some(rules);
    }
    if let Some(state) = args.state {
        settings.state_file = state;
    }

    tracing_subscriber::fmt()
        .with_env_filter(breakchoice::logging::env_filter(&settings))
        .with_writer(std::io::stderr)
        .init();
    debug!(?settings, "resolved settings");

    let mut out = std::io::stdout().lock();
    match args.command {
        Command::Rules { json } => {
            let table = settings.load_rules().context("Failed to load rules")?;
            if json {
                commands::print_rules_json(&mut out, &table)?;
            } else {
                commands::print_rules(&mut out, &table)?;
            }
        }
        Command::Keys(site) => commands::print_keys(&mut out, &site.call_site())?,
        Command::Explain(site) => {
            let table = settings.load_rules().context("Failed to load rules")?;
            let mut counters = breakchoice::CounterStore::file(&settings.state_file);
            commands::explain(&mut out, &table, &mut counters, &site.call_site())?;
        }
        Command::Counters { action } => {
            let mut counters = breakchoice::CounterStore::file(&settings.state_file);
            match action {
                CountersAction::List => commands::print_counters(&mut out, &mut counters)?,
                CountersAction::Reset { key, all } => {
                    commands::reset_counters(&mut out, &mut counters, key.as_deref(), all)?
                }
            }
        }
    }

    Ok(())
}
