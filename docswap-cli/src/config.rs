//! CLI configuration file.

use anyhow::{Context, Result};
use conversion_router::{CommandEngine, CommandEngineConfig, ConversionRouter, TextEngine};
use docswap::ManagerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const CONFIG_DIR_NAME: &str = "docswap";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Contents of `config.toml`.
///
/// ```toml
/// [manager.worker_pool]
/// max_workers = 4
///
/// [[engines]]
/// name = "LibreOffice"
/// program = "soffice"
/// command = "soffice --headless --convert-to {output_format} --outdir {output_dir} {input}"
/// matrix = { docx = ["pdf"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub manager: ManagerConfig,

    /// External tools, tried after the built-in text engine.
    #[serde(default)]
    pub engines: Vec<CommandEngineConfig>,
}

impl AppConfig {
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        path.map(Path::to_path_buf).or_else(Self::default_path)
    }

    /// Load the config file, falling back to defaults when it does not exist,
    /// then apply `DOCSWAP_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path.is_some();
        let mut config = match Self::resolve_path(path) {
            Some(path) if path.exists() => {
                debug!("Loading config from {}", path.display());
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))?
            }
            Some(path) => {
                if explicit {
                    warn!("Config file {} not found, using defaults", path.display());
                }
                Self::default()
            }
            None => Self::default(),
        };

        config
            .manager
            .apply_overrides_from(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Overwrite the config file with defaults.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve_path(path).context("No configuration directory available")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, Self::default().show()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Built-in text engine first, then configured command engines.
    pub fn build_router(&self) -> ConversionRouter {
        self.engines
            .iter()
            .cloned()
            .fold(
                ConversionRouter::builder().engine(TextEngine::new()),
                |builder, engine| builder.engine(CommandEngine::new(engine)),
            )
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_engines_and_manager() {
        let config = AppConfig::parse(
            r#"
            [manager.worker_pool]
            max_workers = 6

            [manager.janitor]
            retention_secs = 120

            [[engines]]
            name = "Echo"
            command = "cp {input} {output}"
            matrix = { md = ["txt"] }
            "#,
        )
        .unwrap();

        assert_eq!(config.manager.worker_pool.max_workers, 6);
        assert_eq!(config.manager.worker_pool.job_timeout_secs, 300);
        assert_eq!(config.manager.janitor.retention_secs, 120);
        assert_eq!(config.engines.len(), 1);
        assert_eq!(config.engines[0].timeout_secs, 600);

        let router = config.build_router();
        assert!(router.can_convert("md", "txt"));
        assert!(router.can_convert("txt", "html"));
        assert_eq!(router.engines().len(), 2);
    }

    #[test]
    fn test_reset_writes_loadable_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let written = AppConfig::reset(Some(&path)).unwrap();
        assert_eq!(written, path);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(AppConfig::parse(&raw).unwrap(), AppConfig::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::load(Some(&temp_dir.path().join("absent.toml"))).unwrap();
        assert!(config.engines.is_empty());
    }
}
