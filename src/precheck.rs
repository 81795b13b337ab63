//! Startup checks: privilege and the file to serve.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// Errors raised before anything is bound or opened.
#[derive(Debug, Error)]
pub enum PrecheckError {
    #[error("This program must be run with sudo or as root when firewall integration is enabled")]
    NotPrivileged,

    #[error("The file {0} does not exist")]
    FileNotFound(PathBuf),

    #[error("{0} is not a regular file")]
    NotAFile(PathBuf),

    #[error("Error getting absolute path of {path}")]
    PathResolution {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("File name of {0} is not valid UTF-8")]
    InvalidFileName(PathBuf),
}

/// Result type for precheck operations
pub type PrecheckResult<T> = Result<T, PrecheckError>;

/// Fail unless the process runs with root privileges.
pub fn ensure_privileged() -> PrecheckResult<()> {
    if is_root::is_root() {
        Ok(())
    } else {
        Err(PrecheckError::NotPrivileged)
    }
}

/// The single file being shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeTarget {
    absolute_path: PathBuf,
    file_name: String,
    encoded_route: String,
}

impl ServeTarget {
    /// Validate `path` and build the target from it.
    ///
    /// The path is made absolute without resolving symlinks, so the served
    /// name is the one the user typed.
    pub fn resolve(path: &Path) -> PrecheckResult<Self> {
        let metadata = match std::fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PrecheckError::FileNotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(PrecheckError::PathResolution {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        if !metadata.is_file() {
            return Err(PrecheckError::NotAFile(path.to_path_buf()));
        }

        let absolute_path =
            std::path::absolute(path).map_err(|source| PrecheckError::PathResolution {
                path: path.to_path_buf(),
                source,
            })?;

        let file_name = absolute_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PrecheckError::InvalidFileName(absolute_path.clone()))?
            .to_string();

        let encoded_route = encode_route(&file_name)
            .ok_or_else(|| PrecheckError::InvalidFileName(absolute_path.clone()))?;

        Ok(Self {
            absolute_path,
            file_name,
            encoded_route,
        })
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    /// Base name of the served file.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The one HTTP path the file is served under.
    pub fn route(&self) -> String {
        format!("/{}", self.file_name)
    }

    /// `route()` with the file name percent-encoded as a path segment.
    ///
    /// Clients send this form for names containing spaces and other
    /// reserved characters.
    pub fn encoded_route(&self) -> &str {
        &self.encoded_route
    }
}

fn encode_route(file_name: &str) -> Option<String> {
    let mut url = Url::parse("http://localhost/").ok()?;
    url.path_segments_mut().ok()?.pop_if_empty().push(file_name);
    Some(url.path().to_string())
}
