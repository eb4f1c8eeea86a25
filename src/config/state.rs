// Application state module
// Built once at startup and handed to every connection

use std::path::{Path, PathBuf};

use super::types::{Config, Mount};
use super::ConfigError;
use crate::serve::{ModuleRegistry, StaticServer};

/// Application state
pub struct AppState {
    pub config: Config,
    pub server: StaticServer,
    pub modules: ModuleRegistry,
    /// Mounts sorted by path length, longest first
    pub mounts: Vec<Mount>,
}

impl AppState {
    /// Validate the configuration and build the state
    ///
    /// The root directory must exist and be a directory. Relative roots and
    /// module paths are anchored at the current working directory.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::WorkingDirectory)?;
        let root = absolutize(&cwd, &config.static_files.root_directory);

        let metadata = std::fs::metadata(&root).map_err(|source| ConfigError::RootDirectory {
            path: root.display().to_string(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ConfigError::RootNotDirectory(root.display().to_string()));
        }

        let mut modules = ModuleRegistry::new();
        for (name, path) in &config.modules {
            modules.register(name, absolutize(&cwd, path));
        }

        for mount in &config.static_files.mounts {
            if !mount.path.starts_with('/') {
                return Err(ConfigError::InvalidMount(mount.path.clone()));
            }
            if let Some(module) = &mount.module {
                if modules.resolve(module).is_none() {
                    return Err(ConfigError::UnknownModule(module.clone()));
                }
            }
        }

        let mut mounts = config.static_files.mounts.clone();
        mounts.sort_by(|a, b| b.path.len().cmp(&a.path.len()));

        Ok(Self {
            config: config.clone(),
            server: StaticServer::new(root),
            modules,
            mounts,
        })
    }

    pub const fn access_log_enabled(&self) -> bool {
        self.config.logging.access_log
    }
}

fn absolutize(cwd: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
