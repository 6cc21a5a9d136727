use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument};

/// Client build identifiers reported by the catalog host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientVersion {
    pub riot_client_version: String,
    pub riot_client_build: String,
}

/// Non-secret application state persisted between launches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub is_logged_in: bool,
    #[serde(default)]
    pub is_data_downloaded: bool,
    #[serde(default)]
    pub token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_version: Option<ClientVersion>,
}

/// Settings held in memory and, unless ephemeral, mirrored to a TOML file
#[derive(Debug)]
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: RwLock<Settings>,
}

impl SettingsStore {
    /// In-memory only settings
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            current: RwLock::new(Settings::default()),
        }
    }

    /// Open the settings file at `path`, starting from defaults if it doesn't exist
    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();

        let settings = if tokio::fs::metadata(&path).await.is_ok() {
            let content = tokio::fs::read(&path)
                .await
                .context("Failed to read settings file")
                .map_err(|e| {
                    error!("Failed to read settings file {}: {}", path.display(), e);
                    SettingsError::ReadFailed {
                        path: path.clone(),
                        source: e,
                    }
                })?;

            toml::from_slice(&content)
                .context("Failed to parse settings file")
                .map_err(|e| {
                    error!("Failed to parse settings file {}: {}", path.display(), e);
                    SettingsError::ParsingFailed {
                        path: path.clone(),
                        source: e,
                    }
                })?
        } else {
            info!("Settings file doesn't exist yet, using defaults");
            Settings::default()
        };

        Ok(Self {
            path: Some(path),
            current: RwLock::new(settings),
        })
    }

    /// Open `settings.toml` in the platform config directory
    pub async fn open_default() -> Result<Self, SettingsError> {
        Self::open(default_settings_path()?).await
    }

    pub async fn get(&self) -> Settings {
        self.current.read().await.clone()
    }

    /// Apply `change` and persist the result
    ///
    /// The in-memory copy only changes once the file write succeeded.
    pub async fn update<F>(&self, change: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut current = self.current.write().await;
        let mut next = current.clone();
        change(&mut next);

        if next == *current {
            return Ok(());
        }

        if let Some(path) = &self.path {
            persist(path, &next).await?;
        }

        *current = next;
        Ok(())
    }
}

async fn persist(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create settings directory")
            .map_err(|e| SettingsError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }

    let toml = toml::to_string_pretty(settings)
        .context("Failed to serialize settings to TOML")
        .map_err(|e| SettingsError::SerializationFailed { source: e })?;

    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, toml)
        .await
        .context("Failed to write settings file")
        .map_err(|e| {
            error!("Failed to write settings file {}: {}", temp_path.display(), e);
            SettingsError::WriteFailed {
                path: temp_path.clone(),
                source: e,
            }
        })?;
    tokio::fs::rename(&temp_path, path)
        .await
        .context("Failed to replace settings file")
        .map_err(|e| SettingsError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    debug!("Saved settings to {}", path.display());
    Ok(())
}

fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let proj_dirs = ProjectDirs::from("com", "vshop", "vshop").ok_or_else(|| {
        error!("Failed to determine project directories - this usually indicates an unsupported OS or missing home directory");
        SettingsError::ProjectDirectoriesUnavailable
    })?;
    Ok(proj_dirs.config_dir().join("settings.toml"))
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(
        "Project directories are unavailable - this usually indicates an unsupported OS or missing home directory"
    )]
    ProjectDirectoriesUnavailable,

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read settings file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to write settings file '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    ParsingFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to serialize settings: {source}")]
    SerializationFailed {
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_missing_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let store = SettingsStore::open(temp_dir.path().join("settings.toml"))
            .await
            .unwrap();

        assert_eq!(store.get().await, Settings::default());
    }

    #[tokio::test]
    async fn test_update_persists_across_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("settings.toml");
        let expiry = Utc::now();

        let store = SettingsStore::open(&path).await.unwrap();
        store
            .update(|s| {
                s.is_logged_in = true;
                s.token_expiry = Some(expiry);
                s.client_version = Some(ClientVersion {
                    riot_client_version: "release-09.07-shipping-12-2671254".to_string(),
                    riot_client_build: "95.0.2.2088.2671254".to_string(),
                });
            })
            .await
            .unwrap();

        let reopened = SettingsStore::open(&path).await.unwrap();
        let settings = reopened.get().await;
        assert!(settings.is_logged_in);
        assert!(!settings.is_data_downloaded);
        assert_eq!(settings.token_expiry, Some(expiry));
        assert_eq!(
            settings.client_version.unwrap().riot_client_build,
            "95.0.2.2088.2671254"
        );
    }

    #[tokio::test]
    async fn test_open_invalid_toml_fails() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("settings.toml");
        tokio::fs::write(&path, "invalid toml content [[[").await.unwrap();

        let result = SettingsStore::open(&path).await;
        assert!(matches!(result, Err(SettingsError::ParsingFailed { .. })));
    }

    #[tokio::test]
    async fn test_ephemeral_store_keeps_changes_in_memory() {
        let store = SettingsStore::ephemeral();
        store.update(|s| s.is_data_downloaded = true).await.unwrap();

        assert!(store.get().await.is_data_downloaded);
    }
}
