//! Compressed tarballs of directories uploaded to a [RemoteStore] using
//! [DriveBackup].

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use derive_more::{Display, Error};

use super::archive::{archive_with_retry, Archiver};
use super::{Backup, Outcome};
use crate::remote::{FileQuery, RemoteError, RemoteFile, RemoteStore};
use crate::util::naming::{archive_file_name, sanitize_target, ARCHIVE_EXTENSION};
use crate::util::process::CommandError;
use crate::util::retention::RetentionSweep;

const LOG_TARGET: &str = "backend::drive";

/// Errors on backup of a single directory.
#[derive(Debug, Display, Error)]
pub enum DriveBackupError {
    /// Both archive attempts failed.
    #[display("unable to tar directory={directory} Error='{source}'")]
    Archive {
        directory: String,
        source: CommandError,
    },
    /// The archive couldn't be uploaded.
    #[display("unable to upload {} Error='{source}'", archive.display())]
    Upload {
        archive: PathBuf,
        source: RemoteError,
    },
}

/// Archives directories into a staging directory and uploads them.
///
/// After a successful upload every remote file whose name contains the
/// target's prefix and that was modified before this backend was created
/// is deleted, so only the newest archive of a target stays in the cloud.
pub struct DriveBackup<'a> {
    store: &'a dyn RemoteStore,
    folder: RemoteFile,
    staging_dir: PathBuf,
    run_started: DateTime<Utc>,
    retry_delay: Duration,
    archiver: Box<dyn Archiver>,
}

impl<'a> DriveBackup<'a> {
    /// Looks up (or creates) the remote folder called `folder_name`.
    pub fn new(
        store: &'a dyn RemoteStore,
        folder_name: &str,
        staging_dir: &Path,
        retry_delay: Duration,
        archiver: Box<dyn Archiver>,
    ) -> Result<Self, RemoteError> {
        let run_started = Utc::now();
        let folder = store.ensure_folder(folder_name)?;

        Ok(Self {
            store,
            folder,
            staging_dir: staging_dir.to_path_buf(),
            run_started,
            retry_delay,
            archiver,
        })
    }

    /// Deletes remote copies of `prefix` older than this run.
    fn prune_remote(&self, prefix: &str) {
        // NOTE: Drive matches `name contains` as a prefix, so `_srv_www`
        // also matches the archives of `_srv_www2`
        let query = FileQuery::new()
            .name_contains(prefix)
            .modified_before(self.run_started);

        let old_files = match self.store.list(&query) {
            Ok(files) => files,
            Err(e) => {
                log::error!(target: LOG_TARGET, "Unable to list old remote copies of {prefix}: {e}");
                return;
            }
        };

        for file in old_files {
            match self.store.delete(&file.id) {
                Ok(()) => log::debug!(target: LOG_TARGET, "Deleted remote file {} ({})", file.name, file.id),
                Err(e) => log::error!(target: LOG_TARGET, "Unable to delete remote file {} ({}): {e}", file.name, file.id),
            }
        }
    }

    /// Removes the staged archives of `prefix`, leaving other files in the
    /// shared staging directory alone.
    fn remove_staged(&self, prefix: &str) {
        let staged_prefix = format!("{prefix}.");
        let sweep = RetentionSweep::new(&self.staging_dir, &staged_prefix).suffix(ARCHIVE_EXTENSION);
        match sweep.purge() {
            Ok(report) => {
                for removed in &report.removed {
                    log::debug!(target: LOG_TARGET, "removing {} from filesystem", removed.display());
                }
                if !report.failed.is_empty() {
                    log::warn!(target: LOG_TARGET, "{} staged archive(s) of {prefix} left behind", report.failed.len());
                }
            }
            Err(e) => {
                log::error!(target: LOG_TARGET, "unable to clean up {}: {e}", self.staging_dir.display())
            }
        }
    }
}

impl Backup for DriveBackup<'_> {
    type Error = DriveBackupError;

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
            .staging_dir
            .join(archive_file_name(&prefix, &Local::now()));
        log::debug!(target: LOG_TARGET, "Taring and gzipping {directory} to {}", archive.display());

        let uploaded = archive_with_retry(self.archiver.as_ref(), source, &archive, self.retry_delay)
            .map_err(|source| DriveBackupError::Archive {
                directory: directory.to_string(),
                source,
            })
            .and_then(|()| {
                self.store
                    .upload(&self.folder.id, &archive)
                    .map_err(|source| DriveBackupError::Upload {
                        archive: archive.clone(),
                        source,
                    })
            });

        self.remove_staged(&prefix);

        let file = uploaded?;
        log::info!(target: LOG_TARGET, "Uploaded {directory} as {} ({})", file.name, file.id);

        self.prune_remote(&prefix);

        Ok(Outcome::Completed(archive))
    }
}
