//! Local file backend
//!
//! State lives in a JSON file (default `keel.state.json`). The previous
//! version is kept next to it as `<file>.backup`, and a `<file>.lock` file
//! created with `create_new` acts as the lock.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendConfig, BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "keel.state.json";

    pub fn with_path(state_path: PathBuf) -> Self {
        let lock_path = sibling(&state_path, "lock");
        Self {
            state_path,
            lock_path,
        }
    }

    /// Relative paths in the config are taken relative to `base_dir`
    pub fn from_config(config: &BackendConfig, base_dir: &Path) -> BackendResult<Self> {
        if config.backend_type != "local" {
            return Err(BackendError::UnsupportedBackend(config.backend_type.clone()));
        }
        let path = PathBuf::from(config.get_string("path").unwrap_or(Self::DEFAULT_STATE_FILE));
        if path.as_os_str().is_empty() {
            return Err(BackendError::Configuration(
                "'path' must not be empty".to_string(),
            ));
        }
        Ok(Self::with_path(base_dir.join(path)))
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn backup_path(&self) -> PathBuf {
        sibling(&self.state_path, "backup")
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match tokio::fs::read_to_string(&self.lock_path).await {
            Ok(content) => Ok(serde_json::from_str(&content).ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(&self.lock_path, e)),
        }
    }

    async fn try_create_lock(&self, lock: &LockInfo) -> BackendResult<bool> {
        let content = serde_json::to_vec_pretty(lock)?;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await;
        match file {
            Ok(mut file) => {
                file.write_all(&content)
                    .await
                    .map_err(|e| BackendError::io(&self.lock_path, e))?;
                file.flush()
                    .await
                    .map_err(|e| BackendError::io(&self.lock_path, e))?;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(BackendError::io(&self.lock_path, e)),
        }
    }

    async fn remove_lock_file(&self) -> BackendResult<()> {
        tokio::fs::remove_file(&self.lock_path)
            .await
            .map_err(|e| BackendError::io(&self.lock_path, e))
    }
}

/// `keel.state.json` -> `keel.state.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match tokio::fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::io(&self.state_path, e)),
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("{}: {}", self.state_path.display(), e))
        })?;
        if state.version > StateFile::CURRENT_VERSION {
            return Err(BackendError::InvalidState(format!(
                "state version {} is newer than supported version {}",
                state.version,
                StateFile::CURRENT_VERSION
            )));
        }
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(existing) = self.read_state().await? {
            if existing.lineage != state.lineage {
                return Err(BackendError::LineageMismatch {
                    expected: existing.lineage,
                    actual: state.lineage.clone(),
                });
            }
            tokio::fs::copy(&self.state_path, self.backup_path())
                .await
                .map_err(|e| BackendError::io(&self.backup_path(), e))?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let tmp_path = sibling(&self.state_path, "tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::io(&tmp_path, e))?;
        tokio::fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::io(&self.state_path, e))?;

        debug!(
            "wrote state serial {} to {}",
            state.serial,
            self.state_path.display()
        );
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        let lock = LockInfo::new(operation);
        if self.try_create_lock(&lock).await? {
            return Ok(lock);
        }

        match self.read_lock().await? {
            Some(existing) if !existing.is_expired() => Err(BackendError::Locked(existing)),
            stale => {
                if let Some(existing) = stale {
                    warn!("removing expired lock {}", existing);
                } else {
                    warn!("removing unreadable lock file {}", self.lock_path.display());
                }
                self.remove_lock_file().await?;
                if self.try_create_lock(&lock).await? {
                    Ok(lock)
                } else {
                    match self.read_lock().await? {
                        Some(winner) => Err(BackendError::Locked(winner)),
                        None => Err(BackendError::LockNotFound(lock.id)),
                    }
                }
            }
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let Some(existing) = self.read_lock().await? else {
            return Err(BackendError::LockNotFound(lock.id.clone()));
        };
        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }
        self.remove_lock_file().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        match self.read_lock().await? {
            Some(existing) if existing.id != lock_id => Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            }),
            Some(_) => self.remove_lock_file().await,
            None => Err(BackendError::LockNotFound(lock_id.to_string())),
        }
    }

    fn location(&self) -> String {
        self.state_path.display().to_string()
    }
}
