use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::deadline::DEFAULT_UTC_OFFSET;

const CONFIG_ENV_VAR: &str = "NUDGE_CONFIG";
const TIMEZONE_ENV_VAR: &str = "NUDGE_TIMEZONE";
const API_URL_ENV_VAR: &str = "NUDGE_API_URL";
const CONFIG_FILE: &str = "nudge.toml";
const TOKEN_FILE: &str = "session.token";
const DEFAULT_TIMEZONE: &str = "Asia/Almaty";
const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSection,
    pub display: DisplaySection,
    pub deadline: DeadlineSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub base_url: String,
    pub token_file: Option<PathBuf>,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            token_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplaySection {
    pub timezone: String,
    pub color: bool,
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            color: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeadlineSection {
    pub default_offset: String,
}

impl Default for DeadlineSection {
    fn default() -> Self {
        Self {
            default_offset: DEFAULT_UTC_OFFSET.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration with the precedence: explicit path override,
    /// then `NUDGE_CONFIG`, then the per-user config directory, then
    /// built-in defaults. `NUDGE_TIMEZONE` and `NUDGE_API_URL` override
    /// individual keys afterwards.
    #[tracing::instrument(skip(override_path))]
    pub fn load(override_path: Option<&Path>) -> anyhow::Result<Self> {
        let mut cfg = match resolve_config_path(override_path) {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let parsed: Config = toml::from_str(&raw)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                info!(file = %path.display(), "loaded config file");
                parsed
            }
            Some(path) => {
                debug!(file = %path.display(), "config file not found; using defaults");
                Config::default()
            }
            None => {
                warn!("no config directory available; using defaults");
                Config::default()
            }
        };

        if let Ok(timezone) = std::env::var(TIMEZONE_ENV_VAR) {
            let trimmed = timezone.trim();
            if !trimmed.is_empty() {
                debug!(timezone = %trimmed, "timezone overridden from environment");
                cfg.display.timezone = trimmed.to_string();
            }
        }

        if let Ok(base_url) = std::env::var(API_URL_ENV_VAR) {
            let trimmed = base_url.trim();
            if !trimmed.is_empty() {
                debug!(base_url = %trimmed, "api base url overridden from environment");
                cfg.api.base_url = trimmed.to_string();
            }
        }

        Ok(cfg)
    }

    /// Where the last-known-good session token is cached.
    pub fn token_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.api.token_file {
            return Ok(path.clone());
        }
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("cannot determine config directory"))?
            .join("nudge");
        Ok(dir.join(TOKEN_FILE))
    }
}

fn resolve_config_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }

    if let Ok(raw) = std::env::var(CONFIG_ENV_VAR) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    dirs::config_dir().map(|dir| dir.join("nudge").join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::Config;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("missing.toml");
        let cfg = Config::load(Some(&path)).expect("load");

        assert_eq!(cfg.display.timezone, "Asia/Almaty");
        assert_eq!(cfg.deadline.default_offset, "+05:00");
        assert_eq!(cfg.api.base_url, "http://127.0.0.1:8000");
    }

    #[test]
    fn file_values_override_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nudge.toml");
        fs::write(
            &path,
            r#"
[api]
base_url = "https://tasks.example.net"

[display]
timezone = "Europe/Berlin"

[deadline]
default_offset = "+01:00"
"#,
        )
        .expect("write config");

        let cfg = Config::load(Some(&path)).expect("load");
        assert_eq!(cfg.api.base_url, "https://tasks.example.net");
        assert_eq!(cfg.display.timezone, "Europe/Berlin");
        assert_eq!(cfg.deadline.default_offset, "+01:00");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nudge.toml");
        fs::write(&path, "[display]\ntimezone = \"Asia/Tokyo\"\n").expect("write config");

        let cfg = Config::load(Some(&path)).expect("load");
        assert_eq!(cfg.display.timezone, "Asia/Tokyo");
        assert_eq!(cfg.deadline.default_offset, "+05:00");
    }

    #[test]
    fn explicit_token_file_wins() {
        let temp = tempdir().expect("tempdir");
        let token_path = temp.path().join("token");
        let mut cfg = Config::default();
        cfg.api.token_file = Some(token_path.clone());

        assert_eq!(cfg.token_path().expect("token path"), token_path);
    }
}
