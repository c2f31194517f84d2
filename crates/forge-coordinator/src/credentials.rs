//! Scoped installation of the shared GCP service-account file
//!
//! Tools read the service account from one fixed path in the home
//! directory. [`ScopedCredentialFile`] installs a file there for the
//! lifetime of the guard and puts back whatever was there before. Holders
//! serialize on a process-wide lock because the path is a single slot.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::Context;
use directories::BaseDirs;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

static CREDENTIAL_SLOT: LazyLock<Arc<Mutex<()>>> = LazyLock::new(|| Arc::new(Mutex::new(())));

/// Relative location of the service account under the home directory
const SERVICE_ACCOUNT_PATH: &str = ".gcp/osServiceAccount.json";

/// Guard for an installed credential file
#[derive(Debug)]
pub struct ScopedCredentialFile {
    target: PathBuf,
    backup: Option<PathBuf>,
    created_dir: Option<PathBuf>,
    _slot: OwnedMutexGuard<()>,
}

impl ScopedCredentialFile {
    /// `~/.gcp/osServiceAccount.json`, if a home directory is known
    pub fn default_target() -> Option<PathBuf> {
        BaseDirs::new().map(|dirs| dirs.home_dir().join(SERVICE_ACCOUNT_PATH))
    }

    /// Install `source` at `target`, waiting for any other holder to release it.
    ///
    /// An existing file at `target` is moved aside and restored on drop.
    pub async fn acquire(target: &Path, source: &Path) -> anyhow::Result<Self> {
        let slot = CREDENTIAL_SLOT.clone().lock_owned().await;
        debug!(target = %target.display(), "Acquired credential slot");

        let parent = target
            .parent()
            .with_context(|| format!("Credential path {} has no parent", target.display()))?;
        let created_dir = if parent.exists() {
            None
        } else {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
            Some(parent.to_path_buf())
        };

        let backup = if target.exists() {
            let backup = backup_path(target);
            std::fs::rename(target, &backup).with_context(|| {
                format!("Failed to back up {} to {}", target.display(), backup.display())
            })?;
            info!(backup = %backup.display(), "Backed up existing credential file");
            Some(backup)
        } else {
            None
        };

        let guard = Self {
            target: target.to_path_buf(),
            backup,
            created_dir,
            _slot: slot,
        };

        // From here on, a failure still restores through Drop
        std::fs::copy(source, target).with_context(|| {
            format!("Failed to install {} at {}", source.display(), target.display())
        })?;
        info!(target = %target.display(), "Installed credential file");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.target
    }

    fn restore(&mut self) -> std::io::Result<()> {
        match self.backup.take() {
            Some(backup) => std::fs::rename(&backup, &self.target)?,
            None => {
                if self.target.exists() {
                    std::fs::remove_file(&self.target)?;
                }
                if let Some(dir) = self.created_dir.take() {
                    std::fs::remove_dir(&dir)?;
                }
            }
        }
        Ok(())
    }
}

impl Drop for ScopedCredentialFile {
    fn drop(&mut self) {
        match self.restore() {
            Ok(()) => debug!(target = %self.target.display(), "Restored credential file"),
            Err(e) => warn!(
                target = %self.target.display(),
                error = %e,
                "Failed to restore credential file"
            ),
        }
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".bak-{}", uuid::Uuid::new_v4()));
    target.with_file_name(name)
}
