//! Backend modules for performing individual backup tasks.
//!
//! Currently the following backends are implemented:
//!
//! - [MysqlBackup]: Compressed dumps of MySQL databases.
//! - [DirectoryBackup]: Compressed tarballs of directories.
//! - [DriveBackup]: Compressed tarballs of directories uploaded to a [RemoteStore].
//!
//! [RemoteStore]: crate::remote::RemoteStore

pub mod archive;
pub mod directory;
pub mod drive;
pub mod mysql;

pub use archive::{Archiver, TarArchiver};
pub use directory::DirectoryBackup;
pub use drive::DriveBackup;
pub use mysql::{Dumper, MysqlBackup, MysqlDump};

use std::fmt::Display;
use std::path::PathBuf;

/// Result of backing up one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The artifact was created (and uploaded, where applicable).
    Completed(PathBuf),
    /// There was nothing to back up.
    Skipped,
}

/// Generic backup backend.
pub trait Backup {
    /// Error that may happen on backup of a single target.
    type Error: Display;

    /// Log target of the backend.
    fn log_target(&self) -> &'static str;

    /// Backs up `target` and applies the retention policy to its artifacts.
    fn backup(&mut self, target: &str) -> Result<Outcome, Self::Error>;
}

/// Targets grouped by their [Outcome].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Backs up every target in order.
///
/// A failing target is logged and doesn't stop the remaining ones.
pub fn backup_all<B: Backup>(backend: &mut B, targets: &[String]) -> RunSummary {
    let mut summary = RunSummary::default();

    for target in targets {
        match backend.backup(target) {
            Ok(Outcome::Completed(artifact)) => {
                log::debug!(target: backend.log_target(), "{target} backed up to {}", artifact.display());
                summary.completed.push(target.clone());
            }
            Ok(Outcome::Skipped) => summary.skipped.push(target.clone()),
            Err(e) => {
                log::error!(target: backend.log_target(), "{e}");
                summary.failed.push(target.clone());
            }
        }
    }

    summary
}
