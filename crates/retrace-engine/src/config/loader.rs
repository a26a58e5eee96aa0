use super::schema::RetraceConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable naming a config file; outranks the search locations.
pub const CONFIG_ENV: &str = "RETRACE_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid config file {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Search order, first existing wins: `$RETRACE_CONFIG`, `./retrace.yaml`,
    /// `~/.retrace/config.yaml`. Defaults when none exists.
    pub async fn load_default() -> Result<RetraceConfig, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let home = dirs::home_dir();
        for path in Self::candidates(from_env, home.as_deref()) {
            if path.exists() {
                return Self::load_from(&path).await;
            }
            debug!(path = %path.display(), "no config here");
        }
        debug!("using built-in configuration");
        Ok(RetraceConfig::default())
    }

    /// An explicit path must exist; otherwise fall back to [`ConfigLoader::load_default`].
    pub async fn load(explicit: Option<&Path>) -> Result<RetraceConfig, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path).await,
            None => Self::load_default().await,
        }
    }

    pub fn candidates(from_env: Option<PathBuf>, home: Option<&Path>) -> Vec<PathBuf> {
        from_env
            .into_iter()
            .chain(std::iter::once(PathBuf::from("./retrace.yaml")))
            .chain(home.map(|h| h.join(".retrace").join("config.yaml")))
            .collect()
    }

    pub async fn load_from(path: &Path) -> Result<RetraceConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: RetraceConfig =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        check(&config).map_err(|reason| ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}

/// Values that would stall polling or disable merging outright.
fn check(config: &RetraceConfig) -> Result<(), String> {
    if config.replay.poll_interval_ms == 0 {
        return Err("replay.poll_interval_ms must be positive".into());
    }
    if config.capture.typing_flush_ms == 0 {
        return Err("capture.typing_flush_ms must be positive".into());
    }
    let gap = config.capture.merge_gap_secs;
    if !gap.is_finite() || gap < 0.0 {
        return Err(format!(
            "capture.merge_gap_secs must be a non-negative number, got {}",
            gap
        ));
    }
    Ok(())
}
