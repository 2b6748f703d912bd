//! Core library for mirroring remote files onto the local filesystem.
//!
//! Two pieces make up the crate:
//!
//! - [`replace`] swaps one or more files into place as a single
//!   all-or-nothing transaction.
//! - [`fetch`] downloads a resource only when the local copy is stale and
//!   commits it through [`replace`].

pub mod error;
pub mod fetch;
pub mod replace;

pub use error::{Error, ErrorKind, FsOperation, Result};
pub use fetch::{FetchConfig, FetchOutcome, FetchStatus, Fetcher, HttpTransport, Transport};
pub use replace::{backup_path, replace, Transaction, UndoAction, UndoLog};
