//! Configuration for the fetcher.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, FsOperation, Result};

/// Configuration for [`Fetcher`](super::Fetcher).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Directory that URL-derived file names are placed in.
    ///
    /// Empty means the process working directory. Explicit destinations are
    /// used as given and ignore this setting.
    pub output_dir: PathBuf,
    /// Base URL that relative resource references are resolved against.
    pub base_url: Option<String>,
    /// Request deadline in seconds (default: 30).
    pub timeout_secs: Option<u64>,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
    /// Skip the freshness check and always transfer.
    pub force: bool,
    /// Stamp downloaded files with the server's `Last-Modified` time.
    pub preserve_mtime: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::new(),
            base_url: None,
            timeout_secs: Some(30),
            user_agent: concat!("fetchkit/", env!("CARGO_PKG_VERSION")).to_string(),
            force: false,
            preserve_mtime: false,
        }
    }
}

impl FetchConfig {
    /// Creates a configuration that places derived file names in `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this structure.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|error| Error::Toml {
            error,
            context: "fetch configuration".to_string(),
        })
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::io(FsOperation::ReadConfig, path, e))?;
        toml::from_str(&text).map_err(|error| Error::Toml {
            error,
            context: path.display().to_string(),
        })
    }

    /// Sets the base URL for relative resource references.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the request deadline. `None` disables it.
    pub fn with_timeout_secs(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Sets the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets force mode.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Sets whether downloaded files keep the server's modification time.
    pub fn preserve_mtime(mut self, preserve: bool) -> Self {
        self.preserve_mtime = preserve;
        self
    }
}
