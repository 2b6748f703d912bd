//! Cached fetching of a single remote resource.
//!
//! A [`Fetcher`] resolves where a resource should live on disk, asks the
//! server whether an existing local copy is still current, and only then
//! transfers the body into a scratch file next to the destination. The
//! scratch file is committed with [`replace`](crate::replace::replace), so the
//! destination is never observed half-written. Dropping the fetch future
//! mid-transfer removes the scratch file as well.

mod config;
mod headers;
mod transport;

pub use config::FetchConfig;
pub use headers::{file_name_from_url, format_http_date, parse_content_disposition, parse_http_date};
pub use transport::{HttpTransport, RemoteMetadata, Transfer, TransferError, Transport};

use std::fs::{self, Permissions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use reqwest::StatusCode;
use serde::Serialize;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, FsOperation, Result};
use crate::replace::replace;

use headers::{sibling, unix_seconds};

const LOG_TARGET: &str = "fetchkit::fetch";

const SCRATCH_PREFIX: &str = ".fetchkit-";
const SCRATCH_SUFFIX: &str = ".part";

/// What a fetch did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FetchStatus {
    /// The local copy was current; nothing was transferred.
    UpToDate,
    /// The resource was transferred and committed.
    Downloaded { bytes: u64 },
}

/// Final destination of a fetch and how it got there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: FetchStatus,
}

/// Downloads one resource at a time, skipping transfers the server reports
/// as unnecessary.
pub struct Fetcher<T = HttpTransport> {
    transport: T,
    config: FetchConfig,
}

impl Fetcher<HttpTransport> {
    /// Creates a fetcher that talks HTTP through `reqwest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: FetchConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self { transport, config })
    }
}

impl<T: Transport> Fetcher<T> {
    /// Creates a fetcher over a custom transport.
    pub fn with_transport(transport: T, config: FetchConfig) -> Self {
        Self { transport, config }
    }

    /// Fetches `resource` and returns the path it now occupies.
    ///
    /// See [`fetch_detailed`](Self::fetch_detailed).
    pub async fn fetch(&self, resource: &str, destination: Option<&Path>) -> Result<PathBuf> {
        self.fetch_detailed(resource, destination)
            .await
            .map(|outcome| outcome.path)
    }

    /// Fetches `resource`, reusing an existing local copy when it is current.
    ///
    /// # Arguments
    ///
    /// * `resource` - Absolute URL, or a reference relative to the configured base URL
    /// * `destination` - Explicit destination. When `None`, the last path
    ///   segment of the URL is used and a `Content-Disposition` file name
    ///   from the server takes precedence over it.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved, a request fails,
    /// the server answers the transfer with a non-success status, or the
    /// scratch file cannot be written or committed. The destination is left
    /// untouched in every error case.
    pub async fn fetch_detailed(
        &self,
        resource: &str,
        destination: Option<&Path>,
    ) -> Result<FetchOutcome> {
        let url = self.resolve_url(resource)?;

        let candidate = match destination {
            Some(path) => path.to_path_buf(),
            None => {
                let name = file_name_from_url(&url).ok_or_else(|| Error::NoFileName {
                    resource: resource.to_string(),
                })?;
                self.config.output_dir.join(name)
            }
        };

        if !self.config.force {
            if let Some(local) = local_mtime(&candidate)? {
                if self.is_current(&url, resource, &candidate, local).await? {
                    debug!(
                        target: LOG_TARGET,
                        resource,
                        destination = %candidate.display(),
                        "local copy is current"
                    );
                    return Ok(FetchOutcome {
                        path: candidate,
                        status: FetchStatus::UpToDate,
                    });
                }
            }
        }

        self.transfer(&url, resource, candidate, destination.is_none())
            .await
    }

    /// Resolves `resource` against the configured base URL.
    fn resolve_url(&self, resource: &str) -> Result<Url> {
        let invalid = |message: String| Error::InvalidResource {
            resource: resource.to_string(),
            message,
        };

        let url = match Url::parse(resource) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .config
                    .base_url
                    .as_deref()
                    .ok_or_else(|| invalid("relative reference without a base URL".to_string()))?;
                Url::parse(base)
                    .and_then(|base| base.join(resource))
                    .map_err(|e| invalid(e.to_string()))?
            }
            Err(e) => return Err(invalid(e.to_string())),
        };

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(invalid(format!("unsupported scheme {}", scheme))),
        }
    }

    /// Asks the server whether the copy modified at `local` is still current.
    async fn is_current(
        &self,
        url: &Url,
        resource: &str,
        candidate: &Path,
        local: SystemTime,
    ) -> Result<bool> {
        let since = format_http_date(local);
        let metadata = self
            .transport
            .head(url, &since)
            .await
            .map_err(|source| Error::Transport {
                resource: resource.to_string(),
                destination: Some(candidate.to_path_buf()),
                source,
            })?;

        if metadata.status == StatusCode::NOT_MODIFIED {
            return Ok(true);
        }

        // Servers do not always honour If-Modified-Since; compare ourselves.
        let Some(raw) = metadata.last_modified.as_deref() else {
            return Ok(false);
        };
        match parse_http_date(raw) {
            Ok(remote) => Ok(unix_seconds(remote) <= unix_seconds(local)),
            Err(e) => {
                debug!(target: LOG_TARGET, resource, error = %e, "cannot confirm freshness");
                Ok(false)
            }
        }
    }

    /// Transfers the body into a scratch file and commits it.
    async fn transfer(
        &self,
        url: &Url,
        resource: &str,
        candidate: PathBuf,
        honour_hint: bool,
    ) -> Result<FetchOutcome> {
        let dir = scratch_dir(&candidate);
        let mut scratch = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(SCRATCH_SUFFIX)
            .tempfile_in(&dir)
            .map_err(|e| Error::io(FsOperation::CreateScratch, &dir, e))?;

        let result = self.transport.get(url, scratch.as_file_mut()).await;
        let transfer = match result {
            Ok(transfer) => transfer,
            Err(TransferError::Network(source)) => {
                return Err(Error::Transport {
                    resource: resource.to_string(),
                    destination: Some(candidate),
                    source,
                })
            }
            Err(TransferError::Write(source)) => {
                return Err(Error::io(FsOperation::WriteScratch, scratch.path(), source))
            }
        };

        if !transfer.metadata.status.is_success() {
            return Err(Error::Status {
                resource: resource.to_string(),
                destination: Some(candidate),
                status: transfer.metadata.status.as_u16(),
            });
        }

        let destination = if honour_hint {
            hinted_destination(&candidate, &transfer.metadata)
        } else {
            candidate
        };

        self.finish_scratch(&scratch, &destination, &transfer.metadata)?;

        commit_scratch(scratch.into_temp_path(), &destination)?;

        debug!(
            target: LOG_TARGET,
            resource,
            destination = %destination.display(),
            bytes = transfer.bytes,
            "downloaded"
        );
        Ok(FetchOutcome {
            path: destination,
            status: FetchStatus::Downloaded {
                bytes: transfer.bytes,
            },
        })
    }

    /// Sets permissions and timestamps, then flushes the scratch file to disk.
    fn finish_scratch(
        &self,
        scratch: &NamedTempFile,
        destination: &Path,
        metadata: &RemoteMetadata,
    ) -> Result<()> {
        let file = scratch.as_file();

        if let Some(permissions) = permissions_for(destination) {
            file.set_permissions(permissions)
                .map_err(|e| Error::io(FsOperation::SetPermissions, scratch.path(), e))?;
        }

        if self.config.preserve_mtime {
            if let Some(remote) = metadata
                .last_modified
                .as_deref()
                .and_then(|raw| parse_http_date(raw).ok())
            {
                if let Err(e) = file.set_modified(remote) {
                    warn!(target: LOG_TARGET, error = %e, "could not preserve modification time");
                }
            }
        }

        file.sync_all()
            .map_err(|e| Error::io(FsOperation::WriteScratch, scratch.path(), e))
    }
}

/// Renames the scratch file onto `destination`, consuming its cleanup guard.
///
/// On failure the guard is dropped here and deletes the scratch file.
fn commit_scratch(scratch: TempPath, destination: &Path) -> Result<()> {
    replace(&[&*scratch], &[destination])?;
    // The file now lives at `destination`.
    drop(scratch.keep());
    Ok(())
}

/// Modification time of an existing regular file at `path`.
fn local_mtime(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta
            .modified()
            .map(Some)
            .map_err(|e| Error::io(FsOperation::Stat, path, e)),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(FsOperation::Stat, path, e)),
    }
}

/// Applies a `Content-Disposition` file name, falling back to `candidate`.
fn hinted_destination(candidate: &Path, metadata: &RemoteMetadata) -> PathBuf {
    let Some(raw) = metadata.content_disposition.as_deref() else {
        return candidate.to_path_buf();
    };

    match parse_content_disposition(raw) {
        Ok(Some(name)) => {
            debug!(target: LOG_TARGET, file_name = %name, "using server-supplied file name");
            sibling(candidate, &name)
        }
        Ok(None) => candidate.to_path_buf(),
        Err(e) => {
            debug!(target: LOG_TARGET, error = %e, "ignoring filename hint");
            candidate.to_path_buf()
        }
    }
}

/// Directory the scratch file must live in for the final rename to be atomic.
fn scratch_dir(candidate: &Path) -> PathBuf {
    match candidate.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Permissions the committed file should carry.
///
/// Keeps the mode of the file being replaced; new files get `0644` on Unix
/// rather than the owner-only mode scratch files are created with.
fn permissions_for(destination: &Path) -> Option<Permissions> {
    if let Ok(meta) = fs::metadata(destination) {
        return Some(meta.permissions());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(Permissions::from_mode(0o644))
    }

    #[cfg(not(unix))]
    {
        None
    }
}
