//! On-disk configuration: `~/.config/rk100s/config.json`. Glue, not core
//! engineering, but a CLI needs *some* persistence to be runnable end
//! to end — adapted from the teacher's own `domain::BackupData` +
//! round-trip discipline, here over JSON per the wire format spec.md §6
//! specifies rather than the teacher's YAML.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine a home directory")]
    NoHomeDir,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiBackend {
    Claude,
    Groq,
}

impl Default for AiBackend {
    fn default() -> Self {
        AiBackend::Claude
    }
}

/// Unknown keys round-trip through `extra` rather than being dropped,
/// so a config file edited by a newer version of this tool doesn't lose
/// fields when re-saved by an older one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ai_backend: AiBackend,
    #[serde(default)]
    pub claude_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub audio_input_device: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_path() -> Result<PathBuf, ConfigError> {
    let home = dirs_home().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".config").join("rk100s").join("config.json"))
}

/// Minimal `$HOME` lookup; the teacher pulls in no dedicated
/// directories crate either, and this tool only ever needs one path.
fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

impl Config {
    /// Load from the default path, returning defaults if the file does
    /// not exist yet.
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load(&default_path()?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_default(&self) -> Result<(), ConfigError> {
        self.save(&default_path()?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let text = serde_json::to_string_pretty(self).expect("Config always serializes");
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.ai_backend, AiBackend::Claude);
        assert!(config.claude_api_key.is_none());
    }

    #[test]
    fn round_trips_known_and_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config {
            ai_backend: AiBackend::Groq,
            claude_api_key: None,
            groq_api_key: Some("gsk_test".to_string()),
            audio_input_device: Some("Built-in Microphone".to_string()),
            extra: serde_json::Map::new(),
        };
        config
            .extra
            .insert("future_field".to_string(), serde_json::json!(true));
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.ai_backend, AiBackend::Groq);
        assert_eq!(loaded.groq_api_key.as_deref(), Some("gsk_test"));
        assert_eq!(loaded.extra.get("future_field"), Some(&serde_json::json!(true)));
    }
}
