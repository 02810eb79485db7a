//! Server configuration.
//!
//! Read from `$XDG_CONFIG_HOME/linshare-mcp/config.toml` (falling back to
//! `~/.config/linshare-mcp/config.toml`) when the file exists, then
//! overridden by `LINSHARE_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::helpers::expand_path;

const ADMIN_API_SEGMENT: &str = "/delegation/v2";
const USER_API_SEGMENT: &str = "/user/v5";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// LinShare user API base (`.../linshare/webservice/rest/user/v5`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_url: Option<String>,

    /// LinShare delegation API base (`.../delegation/v2`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_url: Option<String>,

    /// JWT used as Bearer token against the user API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_token: Option<String>,

    /// Staging directory for assembled uploads.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    #[serde(default = "default_download_dir")]
    pub download_dir: String,

    /// Idle time after which an upload session is reclaimed.
    #[serde(default = "default_session_max_age")]
    pub session_max_age_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_upload_dir() -> String {
    "~/LinShareUploads".into()
}

fn default_download_dir() -> String {
    "~/LinShareDownloads".into()
}

fn default_session_max_age() -> u64 {
    linshare_transfer::DEFAULT_SESSION_MAX_AGE.as_secs()
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_url: None,
            admin_url: None,
            jwt_token: None,
            upload_dir: default_upload_dir(),
            download_dir: default_download_dir(),
            session_max_age_secs: default_session_max_age(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Config {
    /// Loads the configuration file (if any) and applies the environment.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();

        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.infer_urls();
        Ok(config)
    }

    /// Overrides fields from `LINSHARE_*` variables; blank values are
    /// ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = var("LINSHARE_USER_URL") {
            self.user_url = Some(url);
        }
        if let Some(url) = var("LINSHARE_ADMIN_URL") {
            self.admin_url = Some(url);
        }
        if let Some(base) = var("LINSHARE_BASE_URL") {
            if self.admin_url.is_none() {
                self.admin_url = Some(base.clone());
            }
            if self.user_url.is_none() {
                self.user_url = Some(base);
            }
        }
        if let Some(token) = var("LINSHARE_JWT_TOKEN") {
            self.jwt_token = Some(token);
        }
        if let Some(dir) = var("LINSHARE_UPLOAD_DIR") {
            self.upload_dir = dir;
        }
        if let Some(dir) = var("LINSHARE_DOWNLOAD_DIR") {
            self.download_dir = dir;
        }
        if let Some(secs) = var("LINSHARE_SESSION_MAX_AGE_SECS") {
            self.session_max_age_secs = secs
                .trim()
                .parse()
                .context("LINSHARE_SESSION_MAX_AGE_SECS must be a number of seconds")?;
        }
        if let Some(secs) = var("LINSHARE_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = secs
                .trim()
                .parse()
                .context("LINSHARE_SWEEP_INTERVAL_SECS must be a number of seconds")?;
        }
        Ok(())
    }

    /// Derives the missing API base from the other one.
    pub fn infer_urls(&mut self) {
        if self.user_url.is_none() {
            if let Some(admin) = &self.admin_url {
                self.user_url = Some(admin.replace(ADMIN_API_SEGMENT, USER_API_SEGMENT));
            }
        }
        if self.admin_url.is_none() {
            if let Some(user) = &self.user_url {
                self.admin_url = Some(user.replace(USER_API_SEGMENT, ADMIN_API_SEGMENT));
            }
        }
    }

    pub fn upload_path(&self) -> PathBuf {
        expand_path(&self.upload_dir)
    }

    pub fn download_path(&self) -> PathBuf {
        expand_path(&self.download_dir)
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }

    /// Sweep cadence; `0` falls back to the default.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn is_linshare_configured(&self) -> bool {
        self.user_url.is_some() && self.jwt_token.is_some()
    }

    /// Creates the upload and download directories.
    pub fn ensure_directories(&self) -> anyhow::Result<()> {
        for dir in [self.upload_path(), self.download_path()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Returns the configuration file path.
fn config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_path("~/.config"));
    base.join("linshare-mcp").join("config.toml")
}
