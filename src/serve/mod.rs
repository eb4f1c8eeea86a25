//! Static file serving core
//!
//! Resolves untrusted request paths below a trusted root directory and opens
//! the file behind them. Each call walks
//! resolve -> stat -> open and stops at the first failure; nothing is retried.

mod error;
mod outcome;
mod resolver;

pub use error::ServeError;
pub use outcome::{ResolvedFile, SeekableRead, ServeOutcome, StaticBinary, StaticStream};
pub use resolver::{clean, resolve};

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};

use crate::logger;

/// Registered module base directories, keyed by module name
#[derive(Debug, Default, Clone)]
pub struct ModuleRegistry {
    modules: HashMap<String, PathBuf>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, base_path: PathBuf) {
        self.modules.insert(name.to_string(), clean(&base_path));
    }

    pub fn resolve(&self, name: &str) -> Option<&Path> {
        self.modules.get(name).map(PathBuf::as_path)
    }
}

/// Serves files below a root directory configured by the host
#[derive(Debug, Clone)]
pub struct StaticServer {
    root: PathBuf,
}

impl StaticServer {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: clean(root.as_ref()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve `relative_path` from the `prefix` directory below the root
    pub async fn serve(&self, prefix: Option<&str>, relative_path: &str) -> ServeOutcome {
        let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
            return ServeOutcome::NotFound("");
        };
        serve_from(&self.root, prefix, relative_path).await.into()
    }

    /// Serve `relative_path` from the `prefix` directory below a registered module
    pub async fn serve_module(
        &self,
        modules: &ModuleRegistry,
        module_name: &str,
        prefix: Option<&str>,
        relative_path: &str,
    ) -> ServeOutcome {
        let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
            return ServeOutcome::NotFound("");
        };
        let Some(base_path) = modules.resolve(module_name) else {
            logger::log_warning(&format!("Static request for unknown module '{module_name}'"));
            return ServeOutcome::NotFound("");
        };
        serve_from(base_path, prefix, relative_path).await.into()
    }
}

async fn serve_from(
    base: &Path,
    prefix: &str,
    relative_path: &str,
) -> Result<StaticBinary, ServeError> {
    let path = resolve(base, prefix, relative_path)?;

    let resolved = stat(&path).await?;
    if resolved.is_directory {
        return Err(ServeError::Forbidden {
            path: path.display().to_string(),
        });
    }
    if !resolved.is_file {
        return Err(ServeError::NotRegular {
            path: path.display().to_string(),
        });
    }

    logger::log_debug(&format!(
        "Serving {} ({} bytes, modified {})",
        resolved.absolute_path.display(),
        resolved.size,
        resolved
            .modified
            .map_or_else(|| "unknown".to_string(), |t| t.to_rfc3339())
    ));
    open(&resolved.absolute_path).await
}

/// Stat a resolved path
pub async fn stat(path: &Path) -> Result<ResolvedFile, ServeError> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| ServeError::from_io("stat", path, e))?;
    Ok(ResolvedFile {
        absolute_path: path.to_path_buf(),
        is_directory: metadata.is_dir(),
        is_file: metadata.is_file(),
        size: metadata.len(),
        modified: metadata.modified().ok().map(DateTime::<Utc>::from),
    })
}

/// Open a regular file as a seekable static binary
///
/// Length and modification time come from the opened handle. If that lookup
/// fails the file is still served, with unknown length and "now" as its
/// modification time.
pub async fn open(path: &Path) -> Result<StaticBinary, ServeError> {
    let file = File::open(path)
        .await
        .map_err(|e| ServeError::from_io("open", path, e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (length, mod_time) = match file.metadata().await {
        Ok(metadata) => (
            Some(metadata.len()),
            metadata
                .modified()
                .map_or_else(|_| Utc::now(), DateTime::<Utc>::from),
        ),
        Err(e) => {
            logger::log_warning(&format!(
                "Metadata of opened file '{}' unavailable: {e}",
                path.display()
            ));
            (None, Utc::now())
        }
    };

    Ok(StaticBinary::seekable(file, name, length, mod_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: PathBuf,
    }

    /// root/public/img/logo.png (2048 bytes), root/public/css/site.css,
    /// root/secret.txt outside the public prefix
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        std::fs::create_dir_all(root.join("public/img")).unwrap();
        std::fs::create_dir_all(root.join("public/css")).unwrap();
        let logo: Vec<u8> = (0..2048u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(root.join("public/img/logo.png"), logo).unwrap();
        std::fs::write(root.join("public/css/site.css"), "body { margin: 0 }").unwrap();
        std::fs::write(root.join("secret.txt"), "top secret").unwrap();
        Fixture { _dir: dir, root }
    }

    async fn read_all(binary: StaticBinary) -> Vec<u8> {
        let mut buf = Vec::new();
        match binary.stream {
            StaticStream::Seekable(mut reader) => reader.read_to_end(&mut buf).await.unwrap(),
            StaticStream::Sequential(mut reader) => reader.read_to_end(&mut buf).await.unwrap(),
        };
        buf
    }

    #[tokio::test]
    async fn test_serves_file_with_metadata() {
        let fx = fixture();
        let server = StaticServer::new(&fx.root);

        let binary = match server.serve(Some("public"), "img/logo.png").await {
            ServeOutcome::Ok(binary) => binary,
            other => panic!("expected Ok, got {other:?}"),
        };
        assert_eq!(binary.name, "logo.png");
        assert_eq!(binary.length, Some(2048));
        assert!(matches!(binary.stream, StaticStream::Seekable(_)));

        let on_disk = std::fs::read(fx.root.join("public/img/logo.png")).unwrap();
        assert_eq!(read_all(binary).await, on_disk);
    }

    #[tokio::test]
    async fn test_serving_is_idempotent() {
        let fx = fixture();
        let server = StaticServer::new(&fx.root);

        let mut contents = Vec::new();
        for _ in 0..2 {
            let ServeOutcome::Ok(binary) = server.serve(Some("public"), "css/site.css").await else {
                panic!("expected Ok");
            };
            contents.push(read_all(binary).await);
        }
        assert_eq!(contents[0], contents[1]);
        assert_eq!(contents[0], b"body { margin: 0 }");
    }

    #[tokio::test]
    async fn test_traversal_is_not_found() {
        let fx = fixture();
        let server = StaticServer::new(&fx.root);

        for attempt in ["../secret.txt", "../../etc/passwd", "img/../../secret.txt"] {
            let outcome = server.serve(Some("public"), attempt).await;
            assert!(
                matches!(outcome, ServeOutcome::NotFound(_)),
                "{attempt}: {outcome:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_directory_is_forbidden() {
        let fx = fixture();
        let server = StaticServer::new(&fx.root);

        for dir in ["img", "", "img/"] {
            let outcome = server.serve(Some("public"), dir).await;
            assert!(
                matches!(outcome, ServeOutcome::Forbidden("Directory listing not allowed")),
                "{dir:?}: {outcome:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let fx = fixture();
        let server = StaticServer::new(&fx.root);

        let outcome = server.serve(Some("public"), "img/missing.png").await;
        assert!(matches!(outcome, ServeOutcome::NotFound("File not found")));

        // A regular file used as a directory component
        let outcome = server.serve(Some("public"), "img/logo.png/extra").await;
        assert!(matches!(outcome, ServeOutcome::NotFound("File not found")));
    }

    #[tokio::test]
    async fn test_empty_prefix_is_not_found_without_filesystem_access() {
        // The root does not exist, so any filesystem access would surface as
        // "File not found" instead of the bare rejection
        let server = StaticServer::new("/nonexistent/root");
        assert!(matches!(
            server.serve(Some(""), "img/logo.png").await,
            ServeOutcome::NotFound("")
        ));
        assert!(matches!(
            server.serve(None, "img/logo.png").await,
            ServeOutcome::NotFound("")
        ));

        let fx = fixture();
        let server = StaticServer::new(&fx.root);
        assert!(matches!(
            server.serve(Some(""), "secret.txt").await,
            ServeOutcome::NotFound("")
        ));
    }

    #[tokio::test]
    async fn test_serve_module() {
        let fx = fixture();
        let module_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(module_dir.path().join("public")).unwrap();
        std::fs::write(module_dir.path().join("public/admin.js"), "init();").unwrap();

        let mut modules = ModuleRegistry::new();
        modules.register("admin", module_dir.path().to_path_buf());
        let server = StaticServer::new(&fx.root);

        let ServeOutcome::Ok(binary) = server
            .serve_module(&modules, "admin", Some("public"), "admin.js")
            .await
        else {
            panic!("expected Ok");
        };
        assert_eq!(read_all(binary).await, b"init();");

        assert!(matches!(
            server
                .serve_module(&modules, "billing", Some("public"), "admin.js")
                .await,
            ServeOutcome::NotFound(_)
        ));
        assert!(matches!(
            server.serve_module(&modules, "admin", Some(""), "admin.js").await,
            ServeOutcome::NotFound("")
        ));
        // Module boundary holds against traversal into the main root
        let escape = format!("../../{}", fx.root.join("secret.txt").display());
        assert!(matches!(
            server
                .serve_module(&modules, "admin", Some("public"), &escape)
                .await,
            ServeOutcome::NotFound(_)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stat_failure_is_internal_error() {
        let fx = fixture();
        let server = StaticServer::new(&fx.root);

        // A component longer than NAME_MAX fails with ENAMETOOLONG, whatever
        // the privileges of the test process
        let long_name = "a".repeat(300);
        let outcome = server.serve(Some("public"), &long_name).await;
        assert!(
            matches!(
                outcome,
                ServeOutcome::InternalError(ServeError::Internal { action: "stat", .. })
            ),
            "{outcome:?}"
        );
    }
}
