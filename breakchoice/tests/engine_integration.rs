//! End-to-end checks: rule documents on disk, persisted counters across
//! engine restarts, and the interaction channels driven through mocks.

use std::fs;
use std::io;
use std::path::Path;

use breakchoice::{
    breakpoint, call_site, Action, CallSite, CounterStore, Decision, DebugHook, Dialog,
    DispatchOutcome, Engine, LookupKey, Outcome, RuleTable, Settings, SuppressReason, Terminal,
};
use mockall::mock;

mock! {
    pub Hook {}
    impl DebugHook for Hook {
        fn pause(&mut self, site: &CallSite) -> io::Result<()>;
    }
}

mock! {
    pub Zenity {}
    impl Dialog for Zenity {
        fn ask_yes_no(&mut self, prompt: &str) -> io::Result<i32>;
    }
}

mock! {
    pub Tty {}
    impl Terminal for Tty {
        fn read_line(&mut self, prompt: &str) -> io::Result<String>;
    }
}

fn write_rules(dir: &Path, body: &str) -> RuleTable {
    let path = dir.join("breakchoice.cf");
    fs::write(&path, body).unwrap();
    RuleTable::load(&path).unwrap()
}

fn site() -> CallSite {
    CallSite::new("/srv/app/src/net/conn.rs", 42, "flush").with_module_path("app::net::conn")
}

// ---------------------------------------------------------------------------
// Persistence across restarts
// ---------------------------------------------------------------------------

#[test]
fn test_first_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("breakchoice.state");
    let rules = write_rules(dir.path(), r#"{"conn.flush": "FIRST"}"#);

    let mut hook = MockHook::new();
    hook.expect_pause().times(1).returning(|_| Ok(()));
    let mut engine = Engine::builder(rules.clone())
        .counters(CounterStore::file(&state))
        .debugger(hook)
        .build();
    assert!(engine.check(&site()).fired());
    assert!(!engine.check(&site()).fired());

    assert_eq!(fs::read_to_string(&state).unwrap(), "conn.flush/1\n");

    // A fresh process sees the consumed counter.
    let mut hook = MockHook::new();
    hook.expect_pause().never();
    let mut engine = Engine::builder(rules)
        .counters(CounterStore::file(&state))
        .debugger(hook)
        .build();
    assert_eq!(
        engine.check(&site()),
        Outcome::Suppressed {
            reason: SuppressReason::AlreadyFired
        }
    );
}

#[test]
fn test_after_n_threshold_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("state");
    let rules = write_rules(dir.path(), r#"{"net.conn": ["AFTER_N", 3]}"#);

    let build = |times: usize| {
        let mut hook = MockHook::new();
        hook.expect_pause().times(times).returning(|_| Ok(()));
        Engine::builder(rules.clone())
            .counters(CounterStore::file(&state))
            .debugger(hook)
            .build()
    };

    let mut engine = build(0);
    assert!(!engine.check(&site()).fired());
    assert!(!engine.check(&site()).fired());
    drop(engine);

    let mut engine = build(2);
    assert!(engine.check(&site()).fired());
    assert!(engine.check(&site()).fired());
    assert_eq!(engine.counters_mut().get("net.conn"), Some(4));
}

#[test]
fn test_every_n_sequence() {
    let dir = tempfile::tempdir().unwrap();
    let rules = write_rules(dir.path(), r#"{"conn.rs:42": ["EVERY_N", 3]}"#);
    let mut hook = MockHook::new();
    hook.expect_pause().times(1).returning(|_| Ok(()));
    let mut engine = Engine::builder(rules)
        .counters(CounterStore::file(dir.path().join("state")))
        .debugger(hook)
        .build();

    let fired: Vec<bool> = (0..6).map(|_| engine.check(&site()).fired()).collect();
    assert_eq!(fired, vec![false, false, true, false, false, false]);
}

// ---------------------------------------------------------------------------
// Precedence
// ---------------------------------------------------------------------------

#[test]
fn test_line_rule_beats_module_rule() {
    let dir = tempfile::tempdir().unwrap();
    let rules = write_rules(
        dir.path(),
        r#"{
            "conn.rs:42": "NEVER",
            "conn": "ALWAYS",
            "none": "ALWAYS"
        }"#,
    );
    let mut hook = MockHook::new();
    hook.expect_pause().times(1).returning(|_| Ok(()));
    let mut engine = Engine::builder(rules).debugger(hook).build();

    assert_eq!(
        engine.check(&site()),
        Outcome::Suppressed {
            reason: SuppressReason::Never
        }
    );
    // Another line in the same module falls through to the module rule.
    let other =
        CallSite::new("/srv/app/src/net/conn.rs", 7, "open").with_module_path("app::net::conn");
    let found = engine.explain(&other).unwrap();
    assert_eq!(found.key, LookupKey::Pattern("conn".into()));
    assert!(engine.check(&other).fired());
}

#[test]
fn test_default_rule_catches_everything_else() {
    let dir = tempfile::tempdir().unwrap();
    let rules = write_rules(dir.path(), r#"{"Null": ["FIRST", "TRACE"]}"#);
    let mut hook = MockHook::new();
    hook.expect_pause().times(1).returning(|_| Ok(()));
    let mut engine = Engine::builder(rules).debugger(hook).build();

    assert!(engine.check(&CallSite::new("/x/y.rs", 1, "a")).fired());
    assert!(!engine.check(&CallSite::new("/p/q.rs", 2, "b")).fired());
    assert_eq!(engine.counters_mut().get("<default>"), Some(1));
}

// ---------------------------------------------------------------------------
// Interaction channels
// ---------------------------------------------------------------------------

#[test]
fn test_xprompt_asks_dialog_and_records_answer() {
    let mut dialog = MockZenity::new();
    dialog
        .expect_ask_yes_no()
        .withf(|prompt: &str| prompt == "Pause next time?")
        .times(2)
        .returning(|_| Ok(1));
    let mut hook = MockHook::new();
    hook.expect_pause().never();

    let rules = RuleTable::from_document(&serde_json::json!({"conn.flush": "XPROMPT"})).unwrap();
    let mut engine = Engine::builder(rules).dialog(dialog).debugger(hook).build();

    let outcome = engine.check(&site());
    assert_eq!(
        outcome,
        Outcome::Fired {
            decision: Decision::Fire {
                key: LookupKey::Pattern("conn.flush".into()),
                action: Action::Xprompt,
            },
            dispatch: DispatchOutcome::Prompted { response: 1 },
        }
    );
    // The stored answer does not stop the next prompt.
    assert!(engine.check(&site()).fired());
    assert_eq!(engine.counters_mut().get("conn.flush"), Some(1));
}

#[test]
fn test_prompt_reads_terminal() {
    let mut tty = MockTty::new();
    let mut answers = vec!["no more".to_string(), String::new()];
    tty.expect_read_line()
        .times(2)
        .returning(move |_| Ok(answers.pop().unwrap()));

    let rules =
        RuleTable::from_document(&serde_json::json!({"app.net.conn.flush": "PROMPT"})).unwrap();
    let mut engine = Engine::builder(rules).terminal(tty).build();

    engine.check(&site());
    assert_eq!(engine.counters_mut().get("app.net.conn.flush"), Some(1));
    engine.check(&site());
    assert_eq!(engine.counters_mut().get("app.net.conn.flush"), Some(0));
}

#[test]
fn test_collaborator_failure_is_swallowed() {
    let mut hook = MockHook::new();
    hook.expect_pause()
        .returning(|_| Err(io::Error::new(io::ErrorKind::BrokenPipe, "no terminal")));
    let rules = RuleTable::from_document(&serde_json::json!({"conn": "ALWAYS"})).unwrap();
    let mut engine = Engine::builder(rules).debugger(hook).build();

    match engine.check(&site()) {
        Outcome::Fired { dispatch, .. } => assert_eq!(dispatch, DispatchOutcome::Skipped),
        other => panic!("expected fire, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Settings and macros
// ---------------------------------------------------------------------------

#[test]
fn test_engine_from_settings_writes_call_log() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("rules.toml");
    fs::write(&rules_path, "none = \"NEVER\"\n").unwrap();
    let log_path = dir.path().join("log").join("calls.log");

    let settings = Settings {
        rules_file: Some(rules_path),
        state_file: dir.path().join("state"),
        call_log: Some(log_path.clone()),
        ..Settings::default()
    };
    let mut engine = Engine::from_settings(&settings).unwrap();
    engine.check(&site());
    engine.check(&site());

    let log = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("\"/srv/app/src/net/conn.rs\":42/app.net.conn:flush"));
    // NEVER never loads counters, so no state file appears.
    assert!(!dir.path().join("state").exists());
}

#[test]
fn test_from_settings_rejects_duplicate_default() {
    let dir = tempfile::tempdir().unwrap();
    let rules_path = dir.path().join("breakchoice.cf");
    fs::write(&rules_path, r#"{"none": "NEVER", "null": "ALWAYS"}"#).unwrap();
    let settings = Settings {
        rules_file: Some(rules_path),
        call_log: None,
        ..Settings::default()
    };
    let err = Engine::from_settings(&settings).unwrap_err();
    assert_eq!(err.to_string(), "duplicate default rule");
}

fn instrumented(engine: &mut Engine) -> Outcome {
    breakpoint!(engine)
}

#[test]
fn test_breakpoint_macro_with_explicit_engine() {
    let here = call_site!();
    let rules = RuleTable::from_document(&serde_json::json!({
        "engine_integration.instrumented": "FIRST"
    }))
    .unwrap();
    let mut hook = MockHook::new();
    hook.expect_pause()
        .withf(|site: &CallSite| site.function == "instrumented")
        .times(1)
        .returning(|_| Ok(()));
    let mut engine = Engine::builder(rules).debugger(hook).build();

    assert!(instrumented(&mut engine).fired());
    assert!(!instrumented(&mut engine).fired());
    assert_eq!(here.function, "test_breakpoint_macro_with_explicit_engine");
}

#[test]
fn test_global_engine() {
    let mut hook = MockHook::new();
    hook.expect_pause().times(1).returning(|_| Ok(()));
    let engine = Engine::builder(RuleTable::never())
        .countdown(Some(2))
        .debugger(hook)
        .build();
    breakchoice::install(engine);

    assert!(!breakpoint!().fired());
    assert_eq!(breakpoint!(), Outcome::Countdown);
    assert!(!breakpoint!().fired());
    assert_eq!(
        breakchoice::with_global(|e| e.countdown().remaining()),
        Some(0)
    );
    assert!(breakchoice::uninstall().is_some());
}
