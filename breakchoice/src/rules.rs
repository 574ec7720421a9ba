//! Rule Table: pattern to behaviour mapping
//!
//! A rule document maps call-site patterns to a single literal or a list of
//! literals:
//!
//! ```json
//! {
//!     "Controller.rs:495": ["AFTER_N", 3],
//!     "net.conn.flush": "XPROMPT",
//!     "none": "NEVER"
//! }
//! ```
//!
//! Each literal is classified as a [`Mode`], an [`Action`] or an integer
//! count, in that order. A key spelled `null` or `none` (any case) becomes
//! the default rule, used when no pattern matches.

use crate::error::ConfigError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// When a matched rule should fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Never fire
    Never,
    /// Fire on the first hit only
    First,
    /// Fire on every hit
    Always,
    /// Fire once the hit count reaches `count`, and on every hit after
    AfterN,
    /// Count down from `count`; fire when the countdown reaches zero
    EveryN,
}

impl Mode {
    /// The literal used in rule documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Never => "NEVER",
            Self::First => "FIRST",
            Self::Always => "ALWAYS",
            Self::AfterN => "AFTER_N",
            Self::EveryN => "EVERY_N",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEVER" => Ok(Self::Never),
            "FIRST" => Ok(Self::First),
            "ALWAYS" => Ok(Self::Always),
            "AFTER_N" => Ok(Self::AfterN),
            "EVERY_N" => Ok(Self::EveryN),
            _ => Err(()),
        }
    }
}

/// What to do when a rule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Pause into the debugger hook
    Trace,
    /// Ask through a desktop dialog
    Xprompt,
    /// Ask on the terminal
    Prompt,
}

impl Action {
    /// The literal used in rule documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Xprompt => "XPROMPT",
            Self::Prompt => "PROMPT",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRACE" => Ok(Self::Trace),
            "XPROMPT" => Ok(Self::Xprompt),
            "PROMPT" => Ok(Self::Prompt),
            _ => Err(()),
        }
    }
}

/// A single classified literal from a rule document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Literal {
    Mode(Mode),
    Action(Action),
    Count(i64),
}

impl Literal {
    /// Classify a textual literal: mode first, then action, then integer.
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(mode) = text.parse::<Mode>() {
            return Some(Self::Mode(mode));
        }
        if let Ok(action) = text.parse::<Action>() {
            return Some(Self::Action(action));
        }
        text.trim().parse::<i64>().ok().map(Self::Count)
    }

    fn from_value(pattern: &str, value: &Value) -> Result<Self, ConfigError> {
        let parsed = match value {
            Value::String(s) => Self::parse(s),
            Value::Number(n) => n.as_i64().map(Self::Count),
            other => {
                return Err(ConfigError::InvalidValue {
                    pattern: pattern.to_string(),
                    found: other.to_string(),
                })
            }
        };
        parsed.ok_or_else(|| ConfigError::UnknownLiteral {
            pattern: pattern.to_string(),
            literal: value.to_string().trim_matches('"').to_string(),
        })
    }
}

/// Behaviour declared for one pattern. Unset fields are resolved by
/// [`BehaviorSpec::resolve`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BehaviorSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
}

impl BehaviorSpec {
    /// Spec with only a mode set.
    pub fn mode(mode: Mode) -> Self {
        Self {
            mode: Some(mode),
            ..Default::default()
        }
    }

    /// Reduce literals to a spec; later literals of the same kind win.
    pub fn from_literals(literals: impl IntoIterator<Item = Literal>) -> Self {
        let mut spec = Self::default();
        for literal in literals {
            match literal {
                Literal::Mode(m) => spec.mode = Some(m),
                Literal::Action(a) => spec.action = Some(a),
                Literal::Count(c) => spec.count = Some(c),
            }
        }
        spec
    }

    /// Parse a document value (literal or list of literals).
    pub fn from_value(pattern: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Array(items) => {
                let literals = items
                    .iter()
                    .map(|item| Literal::from_value(pattern, item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::from_literals(literals))
            }
            single => Ok(Self::from_literals([Literal::from_value(pattern, single)?])),
        }
    }

    /// Fill in unset fields.
    ///
    /// | mode | action | count | resolved mode |
    /// |---|---|---|---|
    /// | - | - | - | NEVER |
    /// | - | - | set | AFTER_N |
    /// | - | set | - | ALWAYS |
    /// | - | set | set | AFTER_N |
    /// | set | | | as given |
    ///
    /// The action defaults to TRACE.
    pub fn resolve(&self) -> Option<ResolvedRule> {
        let mode = match (self.mode, self.action, self.count) {
            (Some(mode), _, _) => mode,
            (None, None, None) => Mode::Never,
            (None, _, Some(_)) => Mode::AfterN,
            (None, Some(_), None) => Mode::Always,
        };
        let trigger = match mode {
            Mode::Never => Trigger::Never,
            Mode::First => Trigger::First,
            Mode::Always => Trigger::Always,
            Mode::AfterN => Trigger::AfterN(self.count?),
            Mode::EveryN => Trigger::EveryN(self.count?),
        };
        Some(ResolvedRule {
            trigger,
            action: self.action.unwrap_or(Action::Trace),
        })
    }
}

impl fmt::Display for BehaviorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(m) = self.mode {
            parts.push(m.to_string());
        }
        if let Some(a) = self.action {
            parts.push(a.to_string());
        }
        if let Some(c) = self.count {
            parts.push(c.to_string());
        }
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Mode with its count folded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Never,
    First,
    Always,
    AfterN(i64),
    EveryN(i64),
}

impl Trigger {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Never => Mode::Never,
            Self::First => Mode::First,
            Self::Always => Mode::Always,
            Self::AfterN(_) => Mode::AfterN,
            Self::EveryN(_) => Mode::EveryN,
        }
    }

    /// Whether evaluating this trigger reads or writes counters.
    pub fn is_stateful(&self) -> bool {
        !matches!(self, Self::Never | Self::Always)
    }
}

/// A behaviour spec with every default applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRule {
    pub trigger: Trigger,
    pub action: Action,
}

impl fmt::Display for ResolvedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.trigger {
            Trigger::AfterN(n) | Trigger::EveryN(n) => {
                write!(f, "{}({}) -> {}", self.trigger.mode(), n, self.action)
            }
            _ => write!(f, "{} -> {}", self.trigger.mode(), self.action),
        }
    }
}

/// Key probed against the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LookupKey {
    Pattern(String),
    /// The fallback rule slot
    Default,
}

impl LookupKey {
    /// Key used for this lookup key in the counter store.
    pub fn counter_key(&self) -> &str {
        match self {
            Self::Pattern(p) => p,
            Self::Default => DEFAULT_COUNTER_KEY,
        }
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.counter_key())
    }
}

/// Counter-store key for the default rule.
pub const DEFAULT_COUNTER_KEY: &str = "<default>";

/// Whether a document key designates the default rule.
pub fn is_default_alias(key: &str) -> bool {
    key.eq_ignore_ascii_case("null") || key.eq_ignore_ascii_case("none")
}

/// Serialization format of a rule document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleFormat {
    Json,
    Toml,
}

impl RuleFormat {
    /// `.toml` files are TOML; anything else (including `.cf`) is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Normalized, read-only mapping from pattern to behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleTable {
    rules: HashMap<String, BehaviorSpec>,
    default: Option<BehaviorSpec>,
}

impl RuleTable {
    /// Table used when no configuration exists: default = NEVER.
    pub fn never() -> Self {
        Self {
            rules: HashMap::new(),
            default: Some(BehaviorSpec::mode(Mode::Never)),
        }
    }

    /// Build from (pattern, spec) pairs, moving a `null`/`none` key into the
    /// default slot.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (String, BehaviorSpec)>,
    ) -> Result<Self, ConfigError> {
        let mut table = Self::default();
        for (pattern, spec) in entries {
            if spec.resolve().is_none() {
                return Err(ConfigError::MissingCount {
                    mode: spec.mode.map(|m| m.to_string()).unwrap_or_default(),
                    pattern,
                });
            }
            if is_default_alias(&pattern) {
                if table.default.is_some() {
                    return Err(ConfigError::DuplicateDefault);
                }
                table.default = Some(spec);
            } else {
                table.rules.insert(pattern, spec);
            }
        }
        Ok(table)
    }

    /// Build from a parsed document (a mapping of pattern to literal(s)).
    pub fn from_document(doc: &Value) -> Result<Self, ConfigError> {
        let map = doc.as_object().ok_or(ConfigError::NotAMapping)?;
        let entries = map
            .iter()
            .map(|(pattern, value)| {
                BehaviorSpec::from_value(pattern, value).map(|spec| (pattern.clone(), spec))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_entries(entries)
    }

    /// Parse document text in the given format.
    pub fn parse_str(text: &str, format: RuleFormat, origin: &Path) -> Result<Self, ConfigError> {
        let doc: Value = match format {
            RuleFormat::Json => serde_json::from_str(text).map_err(|e| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?,
            RuleFormat::Toml => toml::from_str(text).map_err(|e| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?,
        };
        Self::from_document(&doc)
    }

    /// Read and parse a rule document, picking the format from the extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse_str(&text, RuleFormat::from_path(path), path)?;
        tracing::debug!(path = %path.display(), rules = table.len(), "loaded rule table");
        Ok(table)
    }

    /// Spec registered under `key`, if any.
    pub fn get(&self, key: &LookupKey) -> Option<&BehaviorSpec> {
        match key {
            LookupKey::Pattern(p) => self.rules.get(p),
            LookupKey::Default => self.default.as_ref(),
        }
    }

    pub fn default_rule(&self) -> Option<&BehaviorSpec> {
        self.default.as_ref()
    }

    /// Number of pattern rules, not counting the default.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.default.is_none()
    }

    /// Pattern rules sorted by pattern.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BehaviorSpec)> {
        let mut entries: Vec<_> = self.rules.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }
}
