//! Counter Store: persisted per-pattern counters
//!
//! Backing state for the stateful modes and for remembered prompt answers.
//! The store is loaded on first use and rewritten in full after every
//! mutation, so a crash loses at most the decision in flight.
//!
//! The text format is one `key/value` record per line. Keys are often file
//! paths, so records are split on the last `/`.

use crate::error::CounterError;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Durable storage for the counter map.
pub trait CounterBackend {
    /// Read every record. A missing store is an empty map.
    fn load(&self) -> Result<HashMap<String, i64>, CounterError>;

    /// Replace the stored records with `counts`.
    fn save(&self, counts: &HashMap<String, i64>) -> Result<(), CounterError>;
}

/// Plain-text state file.
#[derive(Debug, Clone)]
pub struct TextFileBackend {
    path: PathBuf,
}

impl TextFileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parse one `key/value` record.
fn parse_record(line: &str) -> Option<(String, i64)> {
    let (key, value) = line.rsplit_once('/')?;
    let value = value.trim().parse().ok()?;
    Some((key.to_string(), value))
}

impl CounterBackend for TextFileBackend {
    fn load(&self) -> Result<HashMap<String, i64>, CounterError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no counter state file");
                return Ok(HashMap::new());
            }
            Err(source) => {
                return Err(CounterError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut counts = HashMap::new();
        for (lineno, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_record(line) {
                Some((key, value)) => {
                    counts.insert(key, value);
                }
                None => tracing::warn!(
                    path = %self.path.display(),
                    line = lineno + 1,
                    "skipping malformed counter record"
                ),
            }
        }
        Ok(counts)
    }

    fn save(&self, counts: &HashMap<String, i64>) -> Result<(), CounterError> {
        let write_err = |source| CounterError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        // Sorted so the file diffs cleanly between runs.
        let sorted: BTreeMap<_, _> = counts.iter().collect();
        let mut body = String::new();
        for (key, value) in sorted {
            body.push_str(&format!("{key}/{value}\n"));
        }
        fs::write(&self.path, body).map_err(write_err)
    }
}

/// Backend that keeps nothing beyond the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    initial: HashMap<String, i64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the backend with existing records.
    pub fn with_counts(initial: HashMap<String, i64>) -> Self {
        Self { initial }
    }
}

impl CounterBackend for MemoryBackend {
    fn load(&self) -> Result<HashMap<String, i64>, CounterError> {
        Ok(self.initial.clone())
    }

    fn save(&self, _counts: &HashMap<String, i64>) -> Result<(), CounterError> {
        Ok(())
    }
}

/// Lazily loaded, eagerly persisted counter map.
///
/// Persistence failures are logged and the in-memory state carries on; the
/// program being debugged is never interrupted by a bad state file.
pub struct CounterStore {
    backend: Box<dyn CounterBackend + Send>,
    counts: Option<HashMap<String, i64>>,
}

impl std::fmt::Debug for CounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CounterStore")
            .field("counts", &self.counts)
            .finish_non_exhaustive()
    }
}

impl CounterStore {
    pub fn new(backend: impl CounterBackend + Send + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            counts: None,
        }
    }

    /// Store backed by a state file.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::new(TextFileBackend::new(path))
    }

    /// Store that is never persisted.
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    pub fn is_loaded(&self) -> bool {
        self.counts.is_some()
    }

    /// Load from the backend if not done yet.
    pub fn ensure_loaded(&mut self) -> &mut HashMap<String, i64> {
        let backend = &self.backend;
        self.counts.get_or_insert_with(|| {
            tracing::debug!("loading counters");
            backend.load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "counter store unreadable, starting empty");
                HashMap::new()
            })
        })
    }

    fn persist(&mut self) {
        if let Some(counts) = &self.counts {
            if let Err(e) = self.backend.save(counts) {
                tracing::warn!(error = %e, "failed to persist counters, continuing in memory");
            }
        }
    }

    pub fn get(&mut self, key: &str) -> Option<i64> {
        self.ensure_loaded().get(key).copied()
    }

    /// Set `key` and persist.
    pub fn set(&mut self, key: &str, value: i64) {
        self.ensure_loaded().insert(key.to_string(), value);
        self.persist();
    }

    /// Add one (starting from zero, saturating) and persist. Returns the new
    /// value.
    pub fn increment(&mut self, key: &str) -> i64 {
        let value = {
            let entry = self.ensure_loaded().entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            *entry
        };
        self.persist();
        value
    }

    /// Subtract one from an existing counter and persist. Returns `None`
    /// without touching anything when the key is absent.
    pub fn decrement(&mut self, key: &str) -> Option<i64> {
        let value = {
            let entry = self.ensure_loaded().get_mut(key)?;
            *entry = entry.saturating_sub(1);
            *entry
        };
        self.persist();
        Some(value)
    }

    /// Return the existing value, or store `value` without persisting.
    pub fn get_or_init(&mut self, key: &str, value: i64) -> i64 {
        *self.ensure_loaded().entry(key.to_string()).or_insert(value)
    }

    /// Drop one counter and persist. Returns the removed value.
    pub fn remove(&mut self, key: &str) -> Option<i64> {
        let removed = self.ensure_loaded().remove(key);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// Drop every counter and persist.
    pub fn clear(&mut self) {
        self.ensure_loaded().clear();
        self.persist();
    }

    /// Sorted copy of all counters.
    pub fn snapshot(&mut self) -> BTreeMap<String, i64> {
        self.ensure_loaded()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
