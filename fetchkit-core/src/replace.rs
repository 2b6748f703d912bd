//! Transactional replacement of one or more files.
//!
//! A [`Transaction`] moves every existing destination aside, renames each
//! source into place and, if any step fails, unwinds the steps already taken
//! in reverse order. Only `rename` and `remove` are used, so a destination is
//! always either its old content or its new content, never a partial copy.
//!
//! No locking is performed. Two transactions racing on the same destination
//! can clobber each other; callers must serialize those externally.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, FsOperation, Result};

const LOG_TARGET: &str = "fetchkit::replace";

/// Atomically replaces each `destinations[i]` with `sources[i]`.
///
/// Either every source ends up at its destination, or the filesystem is
/// restored to its state before the call.
///
/// # Errors
///
/// Returns an argument error, without touching the filesystem, if the lists
/// differ in length or a destination appears twice. Returns the error of the
/// first failing rename otherwise; rollback failures are logged but never
/// replace that error.
pub fn replace<S, D>(sources: &[S], destinations: &[D]) -> Result<()>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
{
    Transaction::new(sources, destinations)?.commit()
}

/// Path an existing destination is moved to while a transaction is in flight.
///
/// Derived from the destination plus the current process id, so backups are
/// easy to attribute and rarely collide across processes.
pub fn backup_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(format!(".{}", std::process::id()));
    PathBuf::from(name)
}

/// A reversible step recorded while a transaction runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoAction {
    /// Rename `from` back to `to`.
    RenameBack { from: PathBuf, to: PathBuf },
    /// Delete a backup that is no longer needed.
    DiscardBackup { path: PathBuf },
}

impl UndoAction {
    fn apply(&self) -> io::Result<()> {
        match self {
            UndoAction::RenameBack { from, to } => fs::rename(from, to),
            UndoAction::DiscardBackup { path } => fs::remove_file(path),
        }
    }
}

/// Ordered record of the steps a transaction has taken.
///
/// `rollback` holds one [`UndoAction::RenameBack`] per completed rename, in
/// the order performed; `discard` holds the backups to delete on success.
#[derive(Debug, Default)]
pub struct UndoLog {
    rollback: Vec<UndoAction>,
    discard: Vec<UndoAction>,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `destination` was moved to `backup`.
    pub fn record_staged(&mut self, destination: &Path, backup: &Path) {
        self.rollback.push(UndoAction::RenameBack {
            from: backup.to_path_buf(),
            to: destination.to_path_buf(),
        });
        self.discard.push(UndoAction::DiscardBackup {
            path: backup.to_path_buf(),
        });
    }

    /// Records that `source` was renamed onto `destination`.
    pub fn record_committed(&mut self, source: &Path, destination: &Path) {
        self.rollback.push(UndoAction::RenameBack {
            from: destination.to_path_buf(),
            to: source.to_path_buf(),
        });
    }

    pub fn rollback_actions(&self) -> &[UndoAction] {
        &self.rollback
    }

    pub fn discard_actions(&self) -> &[UndoAction] {
        &self.discard
    }

    /// Runs every rollback action, last recorded first.
    ///
    /// Every action is attempted even if an earlier one fails. Returns the
    /// actions that failed.
    pub fn rollback(self) -> Vec<(UndoAction, io::Error)> {
        run_reversed(self.rollback)
    }

    /// Deletes the backups, last created first. Returns the deletions that failed.
    pub fn finalize(self) -> Vec<(UndoAction, io::Error)> {
        run_reversed(self.discard)
    }
}

fn run_reversed(actions: Vec<UndoAction>) -> Vec<(UndoAction, io::Error)> {
    let mut failures = Vec::new();
    for action in actions.into_iter().rev() {
        if let Err(e) = action.apply() {
            warn!(target: LOG_TARGET, ?action, error = %e, "undo step failed");
            failures.push((action, e));
        }
    }
    failures
}

/// A validated set of (source, destination) pairs ready to be committed.
#[derive(Debug, Clone)]
pub struct Transaction {
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl Transaction {
    /// Validates the pairs without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] for lists of different lengths,
    /// [`Error::DuplicateDestination`] if a destination appears twice and
    /// [`Error::SourceIsDestination`] if a source is also a destination.
    /// Pairs must not chain: the stage phase would move such a source aside
    /// before it is committed.
    pub fn new<S, D>(sources: &[S], destinations: &[D]) -> Result<Self>
    where
        S: AsRef<Path>,
        D: AsRef<Path>,
    {
        if sources.len() != destinations.len() {
            return Err(Error::ArgumentMismatch {
                sources: sources.len(),
                destinations: destinations.len(),
            });
        }

        let mut seen = HashSet::with_capacity(destinations.len());
        for dest in destinations {
            if !seen.insert(dest.as_ref()) {
                return Err(Error::DuplicateDestination(dest.as_ref().to_path_buf()));
            }
        }
        if let Some(src) = sources.iter().find(|src| seen.contains(src.as_ref())) {
            return Err(Error::SourceIsDestination(src.as_ref().to_path_buf()));
        }

        let pairs = sources
            .iter()
            .zip(destinations)
            .map(|(s, d)| (s.as_ref().to_path_buf(), d.as_ref().to_path_buf()))
            .collect();

        Ok(Self { pairs })
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Backup path each destination would be staged to, in pair order.
    pub fn backups(&self) -> Vec<PathBuf> {
        self.pairs.iter().map(|(_, dest)| backup_path(dest)).collect()
    }

    /// Runs the stage, commit and finalize phases.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing rename after unwinding every
    /// step already taken.
    pub fn commit(self) -> Result<()> {
        let mut log = UndoLog::new();

        if let Err(e) = self.stage(&mut log) {
            Self::abort(log);
            return Err(e);
        }

        if let Err(e) = self.install(&mut log) {
            Self::abort(log);
            return Err(e);
        }

        let leftover = log.finalize();
        if !leftover.is_empty() {
            warn!(
                target: LOG_TARGET,
                count = leftover.len(),
                "transaction committed but some backups could not be removed"
            );
        }

        debug!(target: LOG_TARGET, files = self.pairs.len(), "transaction committed");
        Ok(())
    }

    /// Moves every existing destination to its backup path.
    fn stage(&self, log: &mut UndoLog) -> Result<()> {
        for (_, dest) in &self.pairs {
            match fs::symlink_metadata(dest) {
                Ok(meta) if meta.is_dir() => {
                    let e = io::Error::other("destination is a directory");
                    return Err(Error::io(FsOperation::Stat, dest, e));
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::io(FsOperation::Stat, dest, e)),
            }

            let backup = backup_path(dest);
            fs::rename(dest, &backup).map_err(|e| Error::io(FsOperation::Stage, dest, e))?;
            debug!(
                target: LOG_TARGET,
                destination = %dest.display(),
                backup = %backup.display(),
                "staged existing destination"
            );
            log.record_staged(dest, &backup);
        }
        Ok(())
    }

    /// Renames every source onto its destination.
    fn install(&self, log: &mut UndoLog) -> Result<()> {
        for (src, dest) in &self.pairs {
            fs::rename(src, dest).map_err(|e| Error::io(FsOperation::Commit, dest, e))?;
            log.record_committed(src, dest);
        }
        Ok(())
    }

    fn abort(log: UndoLog) {
        let steps = log.rollback_actions().len();
        let failed = log.rollback();
        if failed.is_empty() {
            debug!(target: LOG_TARGET, steps, "transaction rolled back");
        } else {
            warn!(
                target: LOG_TARGET,
                steps,
                failed = failed.len(),
                "transaction rolled back incompletely"
            );
        }
    }
}
