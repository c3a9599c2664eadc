//! Configuration and service factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use coursegate_core::catalog::StaticCatalog;
use coursegate_core::engine::{EngineConfig, GatingService};
use coursegate_core::traits::{ProgressStore, UserDirectory};

use crate::file::FileStore;
use crate::memory::MemoryStore;

/// Where progress records and users live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Process memory; lost on exit.
    Memory,
    /// JSON state file.
    File {
        #[serde(default = "default_state_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::File {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("./coursegate-state.json")
}

fn default_catalog_dir() -> PathBuf {
    PathBuf::from("./courses")
}

/// Top-level coursegate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoursegateConfig {
    /// Directory scanned (recursively) for course TOML files.
    #[serde(default = "default_catalog_dir")]
    pub catalog_dir: PathBuf,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Default for CoursegateConfig {
    fn default() -> Self {
        Self {
            catalog_dir: default_catalog_dir(),
            storage: StorageConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let var_name = &result[start + 2..start + end];
        let value = std::env::var(var_name).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn resolve_path(path: &Path) -> PathBuf {
    PathBuf::from(resolve_env_vars(&path.to_string_lossy()))
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `coursegate.toml` in the current directory
/// 2. `~/.config/coursegate/config.toml`
///
/// Environment variable overrides: `COURSEGATE_STATE_PATH`, `COURSEGATE_CATALOG_DIR`.
pub fn load_config() -> Result<CoursegateConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<CoursegateConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("coursegate.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<CoursegateConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            config
        }
        None => CoursegateConfig::default(),
    };

    apply_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Apply environment overrides, then resolve `${VAR}` references in paths.
fn apply_overrides(config: &mut CoursegateConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(dir) = lookup("COURSEGATE_CATALOG_DIR") {
        config.catalog_dir = PathBuf::from(dir);
    }
    if let Some(path) = lookup("COURSEGATE_STATE_PATH") {
        config.storage = StorageConfig::File {
            path: PathBuf::from(path),
        };
    }

    config.catalog_dir = resolve_path(&config.catalog_dir);
    if let StorageConfig::File { path } = &mut config.storage {
        *path = resolve_path(path);
    }
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("coursegate"))
}

/// The two storage seams, usually served by one backend.
pub struct Backend {
    pub progress: Arc<dyn ProgressStore>,
    pub users: Arc<dyn UserDirectory>,
}

/// Create a storage backend from its configuration.
pub fn create_backend(config: &StorageConfig) -> Result<Backend> {
    match config {
        StorageConfig::Memory => {
            let store = Arc::new(MemoryStore::new());
            Ok(Backend {
                progress: store.clone(),
                users: store,
            })
        }
        StorageConfig::File { path } => {
            let store = Arc::new(
                FileStore::open(path)
                    .with_context(|| format!("failed to open state file: {}", path.display()))?,
            );
            Ok(Backend {
                progress: store.clone(),
                users: store,
            })
        }
    }
}

/// Load the catalog and storage named by `config` and build a service.
pub fn build_service(config: &CoursegateConfig) -> Result<GatingService> {
    let catalog = if config.catalog_dir.is_dir() {
        StaticCatalog::from_directory(&config.catalog_dir)?
    } else {
        tracing::warn!(
            "catalog directory {} not found, no courses loaded",
            config.catalog_dir.display()
        );
        StaticCatalog::default()
    };
    tracing::info!("loaded {} course(s)", catalog.len());

    let backend = create_backend(&config.storage)?;
    Ok(GatingService::new(
        Arc::new(catalog),
        backend.progress,
        backend.users,
        config.engine.clone(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_COURSEGATE_TEST_VAR", "data");
        assert_eq!(resolve_env_vars("${_COURSEGATE_TEST_VAR}"), "data");
        assert_eq!(
            resolve_env_vars("/srv/${_COURSEGATE_TEST_VAR}/state.json"),
            "/srv/data/state.json"
        );
        assert_eq!(resolve_env_vars("/srv/${unterminated"), "/srv/${unterminated");
        std::env::remove_var("_COURSEGATE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = CoursegateConfig::default();
        assert_eq!(config.catalog_dir, PathBuf::from("./courses"));
        assert_eq!(config.engine.pending_final_cap, 99);
        assert!(!config.engine.enforce_lockouts);
        assert!(matches!(config.storage, StorageConfig::File { .. }));
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
catalog_dir = "/srv/courses"

[storage]
type = "memory"

[engine]
pending_final_cap = 95
enforce_lockouts = true
"#;
        let config: CoursegateConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.catalog_dir, PathBuf::from("/srv/courses"));
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.engine.pending_final_cap, 95);
        assert!(config.engine.enforce_lockouts);
    }

    #[test]
    fn file_storage_defaults_path() {
        let config: CoursegateConfig = toml::from_str("[storage]\ntype = \"file\"\n").unwrap();
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from("./coursegate-state.json")
            }
        );
    }

    #[test]
    fn overrides_replace_paths() {
        let vars: HashMap<&str, &str> = [
            ("COURSEGATE_CATALOG_DIR", "/tmp/courses"),
            ("COURSEGATE_STATE_PATH", "/tmp/state.json"),
        ]
        .into_iter()
        .collect();
        let mut config = CoursegateConfig {
            storage: StorageConfig::Memory,
            ..Default::default()
        };
        apply_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.catalog_dir, PathBuf::from("/tmp/courses"));
        assert_eq!(
            config.storage,
            StorageConfig::File {
                path: PathBuf::from("/tmp/state.json")
            }
        );
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config_from(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn build_service_without_catalog_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoursegateConfig {
            catalog_dir: dir.path().join("missing"),
            storage: StorageConfig::Memory,
            engine: EngineConfig::default(),
        };
        assert!(build_service(&config).is_ok());
    }
}
