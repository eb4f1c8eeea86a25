// Configuration module entry point
// Loads configuration and builds the runtime state handed to the server

mod state;
mod types;

use std::net::SocketAddr;
use thiserror::Error;

// Re-export public types
pub use state::AppState;
pub use types::{Config, Mount};

/// Startup configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("cannot determine working directory: {0}")]
    WorkingDirectory(std::io::Error),

    #[error("root directory '{path}' is not accessible: {source}")]
    RootDirectory {
        path: String,
        source: std::io::Error,
    },

    #[error("root directory '{0}' is not a directory")]
    RootNotDirectory(String),

    #[error("mount path '{0}' must start with '/'")]
    InvalidMount(String),

    #[error("mount refers to unregistered module '{0}'")]
    UnknownModule(String),

    #[error("invalid listen address: {0}")]
    InvalidAddress(String),
}

impl Config {
    /// Load configuration from specified file path (without extension)
    /// Default config file is "config.toml" when no path specified
    pub fn load_from(config_path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("SERVER").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("http.server_name", "static_server/0.1")?
            .set_default("static_files.root_directory", ".")?
            .build()?;

        let mut cfg: Self = settings.try_deserialize()?;
        if cfg.static_files.mounts.is_empty() {
            cfg.static_files.mounts.push(Mount {
                path: "/public/".to_string(),
                prefix: "public".to_string(),
                module: None,
                content_type: None,
            });
        }
        Ok(cfg)
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigError::InvalidAddress(format!("{e}")))
    }
}
