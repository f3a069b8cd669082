//! Startup and run of the three command line tools.
//!
//! Every tool follows the same sequence: set up logging, read the optional
//! settings file, load the secrets, configure mail alerts and back up each
//! target in order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use derive_more::{Display, Error, From};
use log::LevelFilter;

use crate::backends::{
    backup_all, DirectoryBackup, DriveBackup, MysqlBackup, MysqlDump, RunSummary, TarArchiver,
};
use crate::cli::{CommonArgs, DriveBackupCli, MysqlBackupCli, ZipDirsCli};
use crate::config::{Settings, SettingsError};
use crate::logging::{self, AlertHandle, LogConfig, LoggingError};
use crate::notify::{EmailSettings, SmtpMailer};
use crate::remote::{GoogleDrive, RemoteError};
use crate::secrets::{Secrets, SecretsError};

/// Name of the log file inside the backup directory.
pub const LOG_FILE_NAME: &str = "backuplog.log";

/// Exit status when the secrets file is missing (`-1` as an unsigned byte).
pub const EXIT_MISSING_SECRETS: u8 = 255;

/// Exit status of fatal errors.
pub const EXIT_FATAL: u8 = 2;

/// Fatal errors ending a run.
#[derive(Debug, Display, Error, From)]
pub enum AppError {
    #[from]
    Logging(LoggingError),
    #[from]
    Settings(SettingsError),
    #[from]
    Secrets(SecretsError),
    #[from]
    Remote(RemoteError),
    #[display("unable to create backup directory {}: {source}", path.display())]
    BackupDir { path: PathBuf, source: io::Error },
}

/// Everything a tool needs after a successful startup.
pub struct Session {
    pub settings: Settings,
    pub secrets: Secrets,
    pub alerts: AlertHandle,
}

enum Startup {
    Ready(Session),
    Exit(ExitCode),
}

fn start(
    common: &CommonArgs,
    log_file: &Path,
    default_level: LevelFilter,
) -> Result<Startup, AppError> {
    let level = if common.verbose {
        LevelFilter::Debug
    } else {
        default_level
    };
    let alerts = logging::init(&LogConfig {
        file: log_file.to_path_buf(),
        level,
        echo: common.verbose,
    })?;

    let settings = Settings::resolve(common.config.as_deref())?;

    let secrets = match Secrets::load(&common.secret_file) {
        Ok(secrets) => secrets,
        Err(e @ SecretsError::NotFound(_)) => {
            log::error!("{e}");
            eprintln!("{e}");
            return Ok(Startup::Exit(ExitCode::from(EXIT_MISSING_SECRETS)));
        }
        Err(e) => return Err(e.into()),
    };

    configure_alerts(&alerts, &secrets, common.admin(), &settings.error_subject);

    Ok(Startup::Ready(Session {
        settings,
        secrets,
        alerts,
    }))
}

/// Attaches an SMTP mailer when an admin address and all `EMAIL_*` secrets
/// are present. Otherwise alerting stays off and the run continues.
fn configure_alerts(alerts: &AlertHandle, secrets: &Secrets, admin: Option<&str>, subject: &str) {
    let email = match EmailSettings::from_secrets(secrets) {
        Ok(email) => email,
        Err(e) => {
            log::info!(target: "notify", "Email alerting disabled: {e}");
            return;
        }
    };
    let Some(admin) = admin else {
        log::info!(target: "notify", "No admin email specified using --email argument, no email logging enabled.");
        return;
    };

    match SmtpMailer::new(&email, admin) {
        Ok(mailer) => {
            alerts.enable(Box::new(mailer), subject);
            log::debug!(target: "notify", "Sending alerts to {admin} via {}", email.host);
        }
        Err(e) => log::warn!(target: "notify", "Email alerting disabled: {e}"),
    }
}

fn test_log() -> ExitCode {
    log::info!("Test of logging capabilities for info messages");
    log::error!("Test of logging capabilities for error messages");
    ExitCode::SUCCESS
}

fn log_summary(summary: &RunSummary) {
    if !summary.is_success() {
        log::warn!("Backup of {:?} failed", summary.failed);
    }
    log::debug!(
        "Finished run: {} completed, {} skipped, {} failed",
        summary.completed.len(),
        summary.skipped.len(),
        summary.failed.len()
    );
}

fn prepare_backup_dir(backup_dir: &Path) -> Result<PathBuf, AppError> {
    fs::create_dir_all(backup_dir).map_err(|source| AppError::BackupDir {
        path: backup_dir.to_path_buf(),
        source,
    })?;

    Ok(backup_dir.join(LOG_FILE_NAME))
}

/// Runs `mysql_backup`.
pub fn mysql_backup(cli: MysqlBackupCli) -> Result<ExitCode, AppError> {
    let log_file = prepare_backup_dir(&cli.local.backup_dir)?;
    let session = match start(&cli.common, &log_file, LevelFilter::Debug)? {
        Startup::Ready(session) => session,
        Startup::Exit(code) => return Ok(code),
    };
    if cli.common.test_log {
        return Ok(test_log());
    }

    let mut backend = MysqlBackup::new(
        &cli.local.backup_dir,
        cli.local.keep(),
        &session.secrets,
        &cli.databases,
        Box::new(MysqlDump),
    )?;
    let summary = backup_all(&mut backend, &cli.databases);
    log_summary(&summary);

    Ok(ExitCode::SUCCESS)
}

/// Runs `zip_dirs`.
pub fn zip_dirs(cli: ZipDirsCli) -> Result<ExitCode, AppError> {
    let log_file = prepare_backup_dir(&cli.local.backup_dir)?;
    let session = match start(&cli.common, &log_file, LevelFilter::Debug)? {
        Startup::Ready(session) => session,
        Startup::Exit(code) => return Ok(code),
    };
    if cli.common.test_log {
        return Ok(test_log());
    }

    let mut backend = DirectoryBackup::new(
        &cli.local.backup_dir,
        &session.settings.current_dir_name,
        cli.local.keep(),
        session.settings.retry_delay(),
        Box::new(TarArchiver),
    );
    let summary = backup_all(&mut backend, &cli.directories);
    log_summary(&summary);

    Ok(ExitCode::SUCCESS)
}

/// Runs `drive_backup`.
pub fn drive_backup(cli: DriveBackupCli) -> Result<ExitCode, AppError> {
    let session = match start(&cli.common, &cli.log_file, LevelFilter::Info)? {
        Startup::Ready(session) => session,
        Startup::Exit(code) => return Ok(code),
    };
    if cli.common.test_log {
        return Ok(test_log());
    }

    let drive = GoogleDrive::from_key_file(&cli.key_file)?;
    let mut backend = DriveBackup::new(
        &drive,
        &session.settings.drive_folder,
        &session.settings.staging_dir,
        session.settings.retry_delay(),
        Box::new(TarArchiver),
    )?;
    let summary = backup_all(&mut backend, &cli.directories);
    log_summary(&summary);

    // the summary goes out even when nothing failed
    session.alerts.set_threshold(LevelFilter::Info);
    session.alerts.set_subject(session.settings.summary_subject.as_str());
    log::info!(
        target: "backend::drive",
        "Uploaded the following directories to Google Drive: {:?}",
        summary.completed
    );

    Ok(ExitCode::SUCCESS)
}

/// Exits the process with status 0 on Ctrl-C.
pub fn install_interrupt_handler() {
    if let Err(e) = ctrlc::set_handler(|| std::process::exit(0)) {
        eprintln!("Unable to install interrupt handler: {e}");
    }
}

/// Logs and prints a fatal error, returning the matching exit status.
pub fn report_fatal(program: &str, error: &AppError) -> ExitCode {
    log::error!("{error}");

    let indent = " ".repeat(program.len());
    eprintln!("{program}: {error}");
    eprintln!("{indent}  for help use --help");

    ExitCode::from(EXIT_FATAL)
}
