//! Error types and result aliases.

use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by [`Transport`](crate::fetch::Transport) implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mismatched number of source ({sources}) and destination ({destinations}) files")]
    ArgumentMismatch { sources: usize, destinations: usize },

    #[error("Destination listed more than once in one transaction: {0}")]
    DuplicateDestination(PathBuf),

    #[error("Path is both a source and a destination in one transaction: {0}")]
    SourceIsDestination(PathBuf),

    #[error("Cannot derive a file name from resource {resource}. Pass an explicit destination.")]
    NoFileName { resource: String },

    #[error("Invalid resource reference {resource}: {message}")]
    InvalidResource { resource: String, message: String },

    #[error("Request for {resource} failed{}: {source}", display_destination(.destination))]
    Transport {
        resource: String,
        destination: Option<PathBuf>,
        #[source]
        source: BoxError,
    },

    #[error("Request for {resource} returned HTTP {status}")]
    Status {
        resource: String,
        destination: Option<PathBuf>,
        status: u16,
    },

    #[error("Failed to {operation} {}: {source}", .path.display())]
    Io {
        operation: FsOperation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {header} header: {value:?}")]
    MetadataParse { header: &'static str, value: String },

    #[error("TOML parse error in {context}: {error}")]
    Toml {
        error: toml::de::Error,
        context: String,
    },

    #[error("Failed to create HTTP client: {0}")]
    Client(String),
}

/// Coarse classification of an [`Error`], for callers deciding between retry and abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Argument,
    ResourceIdentifier,
    Transport,
    Filesystem,
    MetadataParse,
    Config,
}

/// Filesystem operation that produced an [`Error::Io`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOperation {
    Stat,
    Stage,
    Commit,
    CreateScratch,
    WriteScratch,
    SetPermissions,
    ReadConfig,
}

impl std::fmt::Display for FsOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self {
            FsOperation::Stat => "stat",
            FsOperation::Stage => "move aside",
            FsOperation::Commit => "move into place",
            FsOperation::CreateScratch => "create scratch file in",
            FsOperation::WriteScratch => "write scratch file",
            FsOperation::SetPermissions => "set permissions on",
            FsOperation::ReadConfig => "read config",
        };
        f.write_str(verb)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ArgumentMismatch { .. }
            | Error::DuplicateDestination(_)
            | Error::SourceIsDestination(_)
            | Error::NoFileName { .. } => ErrorKind::Argument,
            Error::InvalidResource { .. } => ErrorKind::ResourceIdentifier,
            Error::Transport { .. } | Error::Status { .. } => ErrorKind::Transport,
            Error::Io { .. } => ErrorKind::Filesystem,
            Error::MetadataParse { .. } => ErrorKind::MetadataParse,
            Error::Toml { .. } | Error::Client(_) => ErrorKind::Config,
        }
    }

    /// Destination that had been resolved when a request failed.
    pub fn destination(&self) -> Option<&std::path::Path> {
        match self {
            Error::Transport { destination, .. } | Error::Status { destination, .. } => {
                destination.as_deref()
            }
            _ => None,
        }
    }

    pub(crate) fn io(operation: FsOperation, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

fn display_destination(destination: &Option<PathBuf>) -> String {
    match destination {
        Some(path) => format!(" (destination {})", path.display()),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = Error::ArgumentMismatch {
            sources: 1,
            destinations: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Argument);

        let err = Error::io(
            FsOperation::Commit,
            "out.proto",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert_eq!(err.kind(), ErrorKind::Filesystem);
        assert!(err.to_string().contains("move into place out.proto"));
    }

    #[test]
    fn test_transport_error_carries_destination() {
        let err = Error::Transport {
            resource: "https://example.com/a.proto".to_string(),
            destination: Some(PathBuf::from("a.proto")),
            source: "connection reset".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.destination(), Some(std::path::Path::new("a.proto")));
        assert!(err.to_string().contains("(destination a.proto)"));
    }
}
