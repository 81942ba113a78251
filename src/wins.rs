//! Persistent win tracking.
//!
//! A process-wide counter keyed by model id: load once at startup, flush on
//! every write, increment exactly once per completed session for the
//! leaderboard winner. The write lock is held across the flush so concurrent
//! sessions cannot lose updates.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::gateway::ModelId;

/// Errors from win-tracker operations.
#[derive(Debug, thiserror::Error)]
pub enum WinsError {
    #[error("wins file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("wins file is not a model→count map: {0}")]
    Malformed(String),

    #[error("lock poisoned")]
    LockPoisoned,
}

/// Result type for win-tracker operations.
pub type WinsResult<T> = Result<T, WinsError>;

/// Shared reference to a WinsStore.
pub type SharedWinsStore = Arc<WinsStore>;

/// Mutex-guarded win counter with JSON persistence.
///
/// On-disk shape is a flat `{"org/model": count}` map, which is also what
/// the display layer's wins endpoint serves.
pub struct WinsStore {
    path: Option<PathBuf>,
    counts: RwLock<BTreeMap<String, u64>>,
}

impl WinsStore {
    /// Load counts from `path`, starting empty if the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> WinsResult<Self> {
        let path = path.into();
        let counts = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| WinsError::Malformed(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(WinsError::Io { path, source }),
        };

        Ok(Self {
            path: Some(path),
            counts: RwLock::new(counts),
        })
    }

    /// Volatile store with no backing file (tests, ephemeral deployments).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            counts: RwLock::new(BTreeMap::new()),
        }
    }

    /// Create a shared reference to this store.
    pub fn shared(self) -> SharedWinsStore {
        Arc::new(self)
    }

    /// Credit one win to `model` and flush. Returns the new count.
    pub fn record_win(&self, model: &ModelId) -> WinsResult<u64> {
        let mut counts = self.counts.write().map_err(|_| WinsError::LockPoisoned)?;
        let count = counts.entry(model.as_str().to_string()).or_insert(0);
        *count += 1;
        let new_count = *count;

        // Flush while still holding the write lock: an interleaved
        // increment must not overwrite this one on disk.
        if let Some(path) = &self.path {
            let raw = serde_json::to_string_pretty(&*counts)
                .map_err(|e| WinsError::Malformed(e.to_string()))?;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| WinsError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            std::fs::write(path, raw).map_err(|source| WinsError::Io {
                path: path.clone(),
                source,
            })?;
        }

        info!(model = %model, wins = new_count, "win recorded");
        Ok(new_count)
    }

    /// Win count for one model (0 if untracked).
    pub fn count(&self, model: &ModelId) -> WinsResult<u64> {
        let counts = self.counts.read().map_err(|_| WinsError::LockPoisoned)?;
        Ok(counts.get(model.as_str()).copied().unwrap_or(0))
    }

    /// The full model→count map, the shape the wins endpoint serves.
    pub fn all(&self) -> WinsResult<BTreeMap<String, u64>> {
        let counts = self.counts.read().map_err(|_| WinsError::LockPoisoned)?;
        Ok(counts.clone())
    }

    /// Top `n` models, descending by count, ties by model id ascending.
    pub fn top_n(&self, n: usize) -> WinsResult<Vec<(ModelId, u64)>> {
        let counts = self.counts.read().map_err(|_| WinsError::LockPoisoned)?;
        let mut entries: Vec<(ModelId, u64)> = counts
            .iter()
            .map(|(model, count)| (ModelId::new(model.clone()), *count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        entries.truncate(n);
        Ok(entries)
    }
}
