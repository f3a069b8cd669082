//! Command line interfaces of the three tools.

use std::path::PathBuf;

use clap::{Args, Parser};

use crate::util::retention::KeepDays;

const SECRETS_HELP: &str = "\
Requires a json-formatted 'secretfile' containing database and email information:

{
    \"MYSQLDB1NAME_DB_USER\": \"db1_username\",
    \"MYSQLDB1NAME_DB_PASS\": \"db1_user_password\",
    \"EMAIL_HOST\": \"smtp.gmail.com\",
    \"EMAIL_PORT\": \"587\",
    \"EMAIL_USER\": \"dummy@gmail.com\",
    \"EMAIL_USE_TLS\": \"True\",
    \"EMAIL_PASS\": \"emailpassword\",
    \"EMAIL_FROM_USER\": \"dummy@gmail.com\"
}";

/// Flags shared by every tool.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Use this secrets file to set database users and passwords.
    #[arg(
        short = 's',
        long = "secretfile",
        default_value = "./.database_secret.json"
    )]
    pub secret_file: PathBuf,

    /// Email address for log error updates.
    #[arg(short = 'e', long = "email")]
    pub admin_email: Option<String>,

    /// Run in verbose mode.
    #[arg(short, long)]
    pub verbose: bool,

    /// Test log and email capabilities (do nothing else).
    #[arg(short = 't', long = "testlog")]
    pub test_log: bool,

    /// TOML file with additional settings; written with defaults if absent.
    #[arg(long = "config", env = "DB_BACKUP_CONFIG")]
    pub config: Option<PathBuf>,
}

impl CommonArgs {
    /// The admin address, if a non-empty one was given.
    pub fn admin(&self) -> Option<&str> {
        self.admin_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}

/// Where to put local backups and for how long to keep them.
#[derive(Args, Debug, Clone)]
pub struct LocalArgs {
    /// Place backup files in BACKUPDIR.
    #[arg(short = 'b', long = "backupdir", default_value = ".")]
    pub backup_dir: PathBuf,

    /// If other backup files exist, keep the last KEEPDAYS worth (negative keeps all).
    #[arg(
        short = 'k',
        long = "keepdays",
        default_value_t = -1,
        allow_negative_numbers = true
    )]
    pub keep_days: i64,
}

impl LocalArgs {
    pub fn keep(&self) -> KeepDays {
        KeepDays::from(self.keep_days)
    }
}

/// Backup MySQL databases into gzip compressed dumps.
#[derive(Parser, Debug)]
#[command(name = "mysql_backup", version, about, after_help = SECRETS_HELP)]
pub struct MysqlBackupCli {
    #[command(flatten)]
    pub local: LocalArgs,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Space separated list of databases to backup.
    #[arg(required = true, value_name = "DATABASES")]
    pub databases: Vec<String>,
}

/// Tar and gzip directories into a backup directory.
#[derive(Parser, Debug)]
#[command(name = "zip_dirs", version, about, after_help = SECRETS_HELP)]
pub struct ZipDirsCli {
    #[command(flatten)]
    pub local: LocalArgs,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Space separated list of directories to zip.
    #[arg(required = true, value_name = "DIRECTORIES")]
    pub directories: Vec<String>,
}

/// Tar and gzip directories and upload them to Google Drive.
#[derive(Parser, Debug)]
#[command(name = "drive_backup", version, about, after_help = SECRETS_HELP)]
pub struct DriveBackupCli {
    /// File to use for logging purposes.
    #[arg(short = 'l', long = "logfile", default_value = "./backup.log")]
    pub log_file: PathBuf,

    /// This file contains the Google Drive service account key.
    #[arg(short = 'k', long = "keyfile", default_value = "./.backup-key.json")]
    pub key_file: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,

    /// Space separated list of directories to zip and upload.
    #[arg(required = true, value_name = "DIRECTORIES")]
    pub directories: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definitions_are_valid() {
        MysqlBackupCli::command().debug_assert();
        ZipDirsCli::command().debug_assert();
        DriveBackupCli::command().debug_assert();
    }

    #[test]
    fn test_mysql_defaults() {
        let cli = MysqlBackupCli::try_parse_from(["mysql_backup", "shop", "blog"]).unwrap();

        assert_eq!(cli.databases, vec!["shop", "blog"]);
        assert_eq!(cli.local.backup_dir, PathBuf::from("."));
        assert_eq!(cli.local.keep(), KeepDays::All);
        assert_eq!(
            cli.common.secret_file,
            PathBuf::from("./.database_secret.json")
        );
        assert_eq!(cli.common.admin(), None);
        assert!(!cli.common.test_log);
    }

    #[test]
    fn test_negative_keepdays() {
        let cli = ZipDirsCli::try_parse_from(["zip_dirs", "-k", "-1", "/srv"]).unwrap();
        assert_eq!(cli.local.keep(), KeepDays::All);

        let cli = ZipDirsCli::try_parse_from(["zip_dirs", "--keepdays", "14", "/srv"]).unwrap();
        assert_eq!(cli.local.keep(), KeepDays::Days(14));
    }

    #[test]
    fn test_targets_are_required() {
        assert!(MysqlBackupCli::try_parse_from(["mysql_backup", "-v"]).is_err());
        assert!(DriveBackupCli::try_parse_from(["drive_backup"]).is_err());
    }

    #[test]
    fn test_drive_flags() {
        let cli = DriveBackupCli::try_parse_from([
            "drive_backup",
            "-l",
            "/var/log/drive.log",
            "-k",
            "/etc/key.json",
            "-e",
            "admin@example.com",
            "-t",
            "/srv/www",
        ])
        .unwrap();

        assert_eq!(cli.log_file, PathBuf::from("/var/log/drive.log"));
        assert_eq!(cli.key_file, PathBuf::from("/etc/key.json"));
        assert_eq!(cli.common.admin(), Some("admin@example.com"));
        assert!(cli.common.test_log);
        assert_eq!(cli.directories, vec!["/srv/www"]);
    }

    #[test]
    fn test_blank_email_disables_alerts() {
        let cli = ZipDirsCli::try_parse_from(["zip_dirs", "-e", "  ", "/srv"]).unwrap();
        assert_eq!(cli.common.admin(), None);
    }
}
