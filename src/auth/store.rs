//! Persisted credential storage.
//!
//! The bearer token survives process restarts as a small JSON document in
//! the storage directory. All access goes through a single in-process lock;
//! the in-memory value is a write-through mirror of the file, so reads at
//! request-dispatch time never touch the disk.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Credential file name in the storage directory
const STORE_FILE: &str = "credential.json";

/// Persisted form of the credential. `stored_at` is diagnostic only; token
/// lifetime policy belongs to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredential {
    access_token: String,
    stored_at: DateTime<Utc>,
}

pub struct TokenStore {
    path: PathBuf,
    current: Mutex<Option<String>>,
}

impl TokenStore {
    /// Open the store, restoring any credential persisted by a previous run.
    /// A malformed credential file is not fatal: it reads as absent.
    pub fn open(storage_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir).with_context(|| {
            format!(
                "Failed to create storage directory {}",
                storage_dir.display()
            )
        })?;
        let path = storage_dir.join(STORE_FILE);

        let restored = match Self::read_file(&path) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable credential file");
                None
            }
        };
        debug!(present = restored.is_some(), "Credential store opened");

        Ok(Self {
            path,
            current: Mutex::new(restored),
        })
    }

    fn read_file(path: &Path) -> Result<Option<String>> {
        if !path.exists() {
            return Ok(None);
        }

        let contents =
            std::fs::read_to_string(path).context("Failed to read credential file")?;
        let stored: StoredCredential =
            serde_json::from_str(&contents).context("Failed to parse credential file")?;
        Ok(Some(stored.access_token))
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current credential, if any.
    pub fn get(&self) -> Option<String> {
        self.lock().clone()
    }

    /// Persist a new credential. The file is written before the in-memory
    /// mirror updates, so a restart mid-login still finds the credential.
    pub fn set(&self, token: &str) -> Result<()> {
        let mut current = self.lock();

        let stored = StoredCredential {
            access_token: token.to_string(),
            stored_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&self.path, contents).context("Failed to write credential file")?;

        *current = Some(token.to_string());
        Ok(())
    }

    /// Remove the credential, reporting whether one was present. Storage I/O
    /// failures are logged and swallowed so teardown cannot fail.
    pub fn clear(&self) -> bool {
        let mut current = self.lock();
        let had_credential = current.take().is_some();

        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!(error = %e, "Failed to remove credential file");
            }
        }

        had_credential
    }
}
