//! Per-environment OCM login sessions
//!
//! Both `rosa` and `ocm` read credentials from the file named by
//! `OCM_CONFIG`. One config file per environment is logged in on first
//! use and shared by every later call in the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use forge_common::OcmEnvironment;
use tokio::sync::Mutex;
use tracing::info;

use super::AuthContext;
use crate::process::{CommandConfig, CommandSpec, run_command};

/// Environment variable both CLIs read their session from
pub const OCM_CONFIG_ENV: &str = "OCM_CONFIG";

#[derive(Debug, Clone)]
pub struct SessionStore {
    login_binary: PathBuf,
    base_dir: PathBuf,
    sessions: Arc<Mutex<HashMap<OcmEnvironment, PathBuf>>>,
}

impl SessionStore {
    /// Sessions are written under `base_dir`; `login_binary` performs the login
    pub fn new(login_binary: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            login_binary: login_binary.into(),
            base_dir: base_dir.into(),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Session file path for `environment` (whether or not logged in yet)
    pub fn config_path(&self, environment: OcmEnvironment) -> PathBuf {
        self.base_dir.join(format!("ocm-{environment}.json"))
    }

    /// Log in to `auth.environment` unless already done; returns the session file.
    pub async fn ensure_login(&self, auth: &AuthContext) -> anyhow::Result<PathBuf> {
        let mut sessions = self.sessions.lock().await;
        if let Some(path) = sessions.get(&auth.environment) {
            return Ok(path.clone());
        }

        std::fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("Failed to create {}", self.base_dir.display()))?;
        let path = self.config_path(auth.environment);
        self.login(&path, auth).await?;

        info!(environment = %auth.environment, "Logged in to OCM");
        sessions.insert(auth.environment, path.clone());
        Ok(path)
    }

    fn login_spec(&self, config_path: &Path, auth: &AuthContext) -> CommandSpec {
        let env = auth
            .environment
            .api_url()
            .unwrap_or_else(|| auth.environment.to_string());
        CommandSpec::new(&self.login_binary)
            .arg("login")
            .secret_arg(format!("--token={}", auth.token))
            .arg(format!("--env={env}"))
            .env(OCM_CONFIG_ENV, config_path.display().to_string())
    }

    async fn login(&self, config_path: &Path, auth: &AuthContext) -> anyhow::Result<()> {
        let spec = self.login_spec(config_path, auth);
        run_command(&spec, &CommandConfig::for_query())
            .await?
            .into_success("OCM login")
            .map(|_| ())
    }
}
