use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::watch;

use super::Settings;

#[derive(Debug, Error)]
pub enum SettingsReadError {
    #[error("settings storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistence collaborator: a key/value store holding the raw settings
/// payload. The store itself decides whether the decoded snapshot changed.
pub trait SettingsBackend: Send + Sync {
    fn read_all(&self) -> Result<Map<String, Value>, SettingsReadError>;
}

/// In-memory backend used by the harness and by tests.
#[derive(Default)]
pub struct MemoryBackend {
    values: Mutex<Map<String, Value>>,
}

impl MemoryBackend {
    pub fn set(&self, key: &str, value: Value) {
        self.values.lock().insert(key.to_string(), value);
    }

    pub fn replace(&self, values: Map<String, Value>) {
        *self.values.lock() = values;
    }
}

impl SettingsBackend for MemoryBackend {
    fn read_all(&self) -> Result<Map<String, Value>, SettingsReadError> {
        Ok(self.values.lock().clone())
    }
}

/// Holds the current `Settings` snapshot and publishes replacements through
/// a watch channel whenever the persisted payload decodes to a structurally
/// different snapshot.
#[derive(Clone)]
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    tx: watch::Sender<Settings>,
}

impl SettingsStore {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        let initial = match backend.read_all() {
            Ok(values) => Settings::from_values(&values),
            Err(err) => {
                tracing::warn!(target: "settings", error = %err, "initial settings read failed; using defaults");
                Settings::default()
            }
        };
        let (tx, _rx) = watch::channel(initial);
        Self { backend, tx }
    }

    pub fn current(&self) -> Settings {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Settings> {
        self.tx.subscribe()
    }

    /// Re-reads the backend. Returns whether a new snapshot was published.
    /// A read failure retains the previous snapshot and reports "no change".
    pub fn reload(&self) -> bool {
        match self.backend.read_all() {
            Ok(values) => {
                let next = Settings::from_values(&values);
                if next == *self.tx.borrow() {
                    return false;
                }
                tracing::info!(target: "settings", ?next, "settings snapshot changed");
                self.tx.send_replace(next);
                true
            }
            Err(err) => {
                tracing::warn!(target: "settings", error = %err, "settings read failed; keeping previous snapshot");
                false
            }
        }
    }
}
