//! Identity persistence
//!
//! The service id handed out by the platform is stored between runs so a
//! restarted worker re-registers as the same service. Storage is pluggable:
//! a JSON file by default, or caller-supplied load/save hooks.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default identity file, relative to the working directory
pub const DEFAULT_IDENTITY_FILE: &str = "orra-service-key.json";

/// Loads and saves the persisted service id
pub trait IdentityStore: Send + Sync {
    /// Previously saved id, if any
    fn load(&self) -> Result<Option<String>>;

    /// Overwrite the saved id
    fn save(&self, service_id: &str) -> Result<()>;
}

/// On-disk record
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedIdentity {
    service_id: String,
}

// ─────────────────────────────────────────────────────────────────
// File Store
// ─────────────────────────────────────────────────────────────────

/// JSON file store: `{"serviceId": "..."}`
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the stored identity. Returns false if nothing was stored.
    pub fn clear(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Identity removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::IoWrite {
                path: self.path.clone(),
                source: e,
            }),
        }
    }
}

impl Default for FileIdentityStore {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTITY_FILE)
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<String>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::IoRead {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        let record: PersistedIdentity = serde_json::from_str(&data)?;
        if record.service_id.is_empty() {
            return Ok(None);
        }
        Ok(Some(record.service_id))
    }

    fn save(&self, service_id: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let data = serde_json::to_string_pretty(&PersistedIdentity {
            service_id: service_id.to_string(),
        })?;
        std::fs::write(&self.path, data).map_err(|e| Error::IoWrite {
            path: self.path.clone(),
            source: e,
        })?;

        debug!(path = %self.path.display(), service_id, "Identity saved");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Callback Store
// ─────────────────────────────────────────────────────────────────

type LoadFn = dyn Fn() -> Result<Option<String>> + Send + Sync;
type SaveFn = dyn Fn(&str) -> Result<()> + Send + Sync;

/// Store backed by caller-supplied hooks (database, secret manager, ...)
pub struct CallbackIdentityStore {
    load: Box<LoadFn>,
    save: Box<SaveFn>,
}

impl CallbackIdentityStore {
    pub fn new<L, S>(load: L, save: S) -> Self
    where
        L: Fn() -> Result<Option<String>> + Send + Sync + 'static,
        S: Fn(&str) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            load: Box::new(load),
            save: Box::new(save),
        }
    }
}

impl fmt::Debug for CallbackIdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackIdentityStore").finish_non_exhaustive()
    }
}

impl IdentityStore for CallbackIdentityStore {
    fn load(&self) -> Result<Option<String>> {
        (self.load)()
    }

    fn save(&self, service_id: &str) -> Result<()> {
        (self.save)(service_id)
    }
}
