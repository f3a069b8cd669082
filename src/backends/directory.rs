//! Compressed tarballs of directories using [DirectoryBackup].
//!
//! Next to the timestamped archives the backup directory holds a
//! `Current` directory with a hard link to the newest archive of each
//! target, so the latest state is always found at a stable location.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Local;
use derive_more::{Display, Error};

use super::archive::{archive_with_retry, Archiver};
use super::{Backup, Outcome};
use crate::util::fs::{link_current, restrict_permissions, CurrentLinkError};
use crate::util::naming::{archive_file_name, sanitize_target};
use crate::util::process::CommandError;
use crate::util::retention::{KeepDays, RetentionSweep};

const LOG_TARGET: &str = "backend::directory";

/// Errors on backup of a single directory.
#[derive(Debug, Display, Error)]
pub enum DirectoryBackupError {
    /// Both archive attempts failed.
    #[display("unable to tar directory={directory} Error='{source}'")]
    Archive {
        directory: String,
        source: CommandError,
    },
    /// The archive was created but couldn't be linked as the current one.
    #[display("directory={directory}, {source}")]
    Current {
        directory: String,
        source: CurrentLinkError,
    },
}

/// Archives directories into a local backup directory.
pub struct DirectoryBackup {
    backup_dir: PathBuf,
    current_dir: PathBuf,
    keep: KeepDays,
    retry_delay: Duration,
    archiver: Box<dyn Archiver>,
}

impl DirectoryBackup {
    pub fn new(
        backup_dir: &Path,
        current_dir_name: &str,
        keep: KeepDays,
        retry_delay: Duration,
        archiver: Box<dyn Archiver>,
    ) -> Self {
        Self {
            backup_dir: backup_dir.to_path_buf(),
            current_dir: backup_dir.join(current_dir_name),
            keep,
            retry_delay,
            archiver,
        }
    }
}

impl Backup for DirectoryBackup {
    type Error = DirectoryBackupError;

    fn log_target(&self) -> &'static str {
        LOG_TARGET
    }

    fn backup(&mut self, directory: &str) -> Result<Outcome, Self::Error> {
        let source = Path::new(directory);
        if !source.exists() {
            log::info!(target: LOG_TARGET, "directory {directory} doesn't exist. Ignoring");
            return Ok(Outcome::Skipped);
        }

        let prefix = sanitize_target(directory);
        let archive = self
            .backup_dir
            .join(archive_file_name(&prefix, &Local::now()));
        log::debug!(target: LOG_TARGET, "Taring and gzipping {directory} to {}", archive.display());

        archive_with_retry(self.archiver.as_ref(), source, &archive, self.retry_delay).map_err(
            |source| DirectoryBackupError::Archive {
                directory: directory.to_string(),
                source,
            },
        )?;

        log::debug!(target: LOG_TARGET, "Deleting files with root name {prefix} older than {:?}", self.keep);
        match RetentionSweep::new(&self.backup_dir, &prefix).sweep(self.keep, SystemTime::now()) {
            Ok(report) if !report.failed.is_empty() => {
                log::warn!(target: LOG_TARGET, "directory={directory}, {} old archives could not be removed", report.failed.len())
            }
            Ok(report) => log::debug!(target: LOG_TARGET, "Removed {} old archives", report.removed.len()),
            Err(e) => log::error!(target: LOG_TARGET, "directory={directory}, Unable to clean up old archives: {e}"),
        }

        if let Err(e) = restrict_permissions(&archive) {
            log::error!(target: LOG_TARGET, "directory={directory}, Unable to chmod 600 on file {}: {e}", archive.display());
        }
        let size = fs::metadata(&archive).map(|m| m.len()).unwrap_or_default();
        log::info!(
            target: LOG_TARGET,
            "deleted old files and tar'd and gzipped {directory} file size={size} to {}",
            archive.display()
        );

        let link = link_current(&archive, &self.current_dir, &prefix).map_err(|source| {
            DirectoryBackupError::Current {
                directory: directory.to_string(),
                source,
            }
        })?;
        log::debug!(target: LOG_TARGET, "Linked current backup {}", link.display());

        Ok(Outcome::Completed(archive))
    }
}
