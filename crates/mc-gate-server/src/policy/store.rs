//! JSON file helpers shared by the policy tables.
//!
//! Loading never fails: a missing file yields the default value, an
//! unreadable or malformed one is logged and also yields the default.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

/// Load `T` from a JSON file, falling back to `T::default()`.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => {
                info!("Loaded {}", path.display());
                value
            }
            Err(e) => {
                warn!("Failed to parse {}: {e}", path.display());
                T::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {e}", path.display());
            T::default()
        }
    }
}

/// Write `value` as pretty JSON, creating the parent directory if needed.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create {}: {e}", parent.display());
            return;
        }
    }
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            if let Err(e) = fs::write(path, json) {
                warn!("Failed to write {}: {e}", path.display());
            }
        }
        Err(e) => warn!("Failed to serialize {}: {e}", path.display()),
    }
}

/// A JSON file rewritten from snapshots on the blocking pool.
///
/// Take a ticket while holding the table lock that guards the snapshot, then
/// call [`JsonFile::save`] after releasing it. A snapshot older than the one
/// already on disk is dropped.
pub struct JsonFile {
    path: PathBuf,
    issued: AtomicU64,
    written: Arc<Mutex<u64>>,
}

impl JsonFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            issued: AtomicU64::new(0),
            written: Arc::new(Mutex::new(0)),
        }
    }

    pub fn ticket(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn save<T: Serialize + Send + 'static>(&self, ticket: u64, snapshot: T) {
        let path = self.path.clone();
        let written = Arc::clone(&self.written);
        let write = move || {
            let mut last = written.lock();
            if ticket > *last {
                save_json(&path, &snapshot);
                *last = ticket;
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            Err(_) => write(),
        }
    }
}

/// Player names compare case-insensitively everywhere.
pub fn name_key(name: &str) -> String {
    name.to_ascii_lowercase()
}
