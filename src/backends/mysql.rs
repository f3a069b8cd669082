//! Compressed dumps of MySQL databases using [MysqlBackup].

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::SystemTime;

use chrono::Local;
use derive_more::{Display, Error, From};
use flate2::write::GzEncoder;
use flate2::Compression;

use super::{Backup, Outcome};
use crate::secrets::{DbCredentials, Secrets, SecretsError};
use crate::util::fs::restrict_permissions;
use crate::util::naming::dump_file_name;
use crate::util::process::{self, CommandError};
use crate::util::retention::{KeepDays, RetentionSweep};

const LOG_TARGET: &str = "backend::mysql";

/// Errors on dumping a single database.
#[derive(Debug, Display, Error, From)]
pub enum DumpError {
    #[display("{_0}")]
    #[from]
    Command(CommandError),
    #[display("writing dump failed: {_0}")]
    #[from]
    Io(io::Error),
}

/// Writes the SQL dump of a database.
pub trait Dumper {
    fn dump(
        &self,
        database: &str,
        credentials: &DbCredentials,
        out: &mut dyn Write,
    ) -> Result<(), DumpError>;
}

/// Runs `mysqldump -u <user> -p<password> <database>`.
#[derive(Debug, Clone, Default)]
pub struct MysqlDump;

impl Dumper for MysqlDump {
    fn dump(
        &self,
        database: &str,
        credentials: &DbCredentials,
        out: &mut dyn Write,
    ) -> Result<(), DumpError> {
        let mut command = Command::new("mysqldump");
        command
            .arg("-u")
            .arg(&credentials.user)
            .arg(format!("-p{}", credentials.password))
            .arg(database)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        log::debug!(target: LOG_TARGET, "using command: {}", process::describe(&command));

        let mut dump_process = command.spawn().map_err(|source| CommandError::Spawn {
            program: "mysqldump".into(),
            source,
        })?;
        log::trace!(target: LOG_TARGET, "Started mysqldump process.");

        // drain stderr concurrently so a chatty mysqldump can't block on a full pipe
        let stderr = dump_process.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut captured = String::new();
                let _ = stderr.read_to_string(&mut captured);
                captured
            })
        });

        let copied = match dump_process.stdout.take() {
            Some(stdout) => io::copy(&mut BufReader::new(stdout), out).map(|_| ()),
            None => Err(io::Error::other("stdout of mysqldump not captured")),
        };

        let status = dump_process.wait()?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(CommandError::Failed {
                program: "mysqldump".into(),
                status,
                stderr: stderr.trim_end().to_string(),
            }
            .into());
        }
        copied?;

        Ok(())
    }
}

/// Errors on backup of a single database.
#[derive(Debug, Display, Error)]
pub enum MysqlBackupError {
    /// The database wasn't part of the run's configuration.
    #[display("database={_0} has no credentials")]
    UnknownDatabase(#[error(ignore)] String),
    /// The dump program failed.
    #[display("database={database} Error='{source}'")]
    Dump {
        database: String,
        source: DumpError,
    },
    /// The dump file couldn't be written.
    #[display("unable to write dump file {}: {source}", path.display())]
    Output { path: PathBuf, source: io::Error },
}

/// The [MysqlBackup] backend dumps databases into gzip compressed SQL files.
pub struct MysqlBackup {
    backup_dir: PathBuf,
    keep: KeepDays,
    credentials: HashMap<String, DbCredentials>,
    dumper: Box<dyn Dumper>,
}

impl MysqlBackup {
    /// Creates the backend for `databases`.
    ///
    /// Credentials of every database are resolved up front, so a missing
    /// secret aborts before anything is dumped.
    pub fn new(
        backup_dir: &Path,
        keep: KeepDays,
        secrets: &Secrets,
        databases: &[String],
        dumper: Box<dyn Dumper>,
    ) -> Result<Self, SecretsError> {
        if backup_dir.is_relative() {
            log::debug!(target: LOG_TARGET, "backup_dir is relative: {}", backup_dir.display());
        }

        let credentials = databases
            .iter()
            .map(|database| Ok((database.clone(), secrets.db_credentials(database)?)))
            .collect::<Result<_, SecretsError>>()?;

        Ok(Self {
            backup_dir: backup_dir.to_path_buf(),
            keep,
            credentials,
            dumper,
        })
    }

    fn write_dump(
        &self,
        database: &str,
        credentials: &DbCredentials,
        path: &Path,
    ) -> Result<(), MysqlBackupError> {
        let output_error = |source| MysqlBackupError::Output {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create_new(path).map_err(output_error)?;
        let mut encoder = GzEncoder::new(file, Compression::default());

        self.dumper
            .dump(database, credentials, &mut encoder)
            .map_err(|source| MysqlBackupError::Dump {
                database: database.to_string(),
                source,
            })?;
        encoder.finish().map_err(output_error)?;

        Ok(())
    }
}

impl Backup for MysqlBackup {
    type Error = MysqlBackupError;

    fn log_target(&self) -> &'static str {
        LOG_TARGET
    }

    fn backup(&mut self, database: &str) -> Result<Outcome, Self::Error> {
        let credentials = self
            .credentials
            .get(database)
            .ok_or_else(|| MysqlBackupError::UnknownDatabase(database.to_string()))?;

        let dump_file = self
            .backup_dir
            .join(dump_file_name(database, &Local::now()));
        log::info!(target: LOG_TARGET, "Backing up and gzipping {database} database to {}", dump_file.display());
        log::trace!(target: LOG_TARGET, "Using user '{}' for backup", credentials.user);

        if let Err(e) = self.write_dump(database, credentials, &dump_file) {
            if let Err(remove_err) = fs::remove_file(&dump_file) {
                if remove_err.kind() != io::ErrorKind::NotFound {
                    log::warn!(target: LOG_TARGET, "Unable to remove partial dump {}: {remove_err}", dump_file.display());
                }
            }
            return Err(e);
        }

        if let Err(e) = restrict_permissions(&dump_file) {
            log::error!(target: LOG_TARGET, "database={database}, Unable to chmod 600 on file {}: {e}", dump_file.display());
        }
        match fs::metadata(&dump_file) {
            Ok(metadata) => {
                log::info!(target: LOG_TARGET, "backed up and gzipped {database} file size={}", metadata.len())
            }
            Err(e) => log::warn!(target: LOG_TARGET, "Unable to stat {}: {e}", dump_file.display()),
        }

        match RetentionSweep::new(&self.backup_dir, database).sweep(self.keep, SystemTime::now()) {
            Ok(report) if !report.failed.is_empty() => {
                log::warn!(target: LOG_TARGET, "database={database}, {} old dumps could not be removed", report.failed.len())
            }
            Ok(report) => log::debug!(target: LOG_TARGET, "Removed {} old dumps", report.removed.len()),
            Err(e) => log::error!(target: LOG_TARGET, "database={database}, Unable to clean up old dumps: {e}"),
        }

        Ok(Outcome::Completed(dump_file))
    }
}
