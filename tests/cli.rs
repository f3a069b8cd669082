//! End to end tests of the three binaries.
//!
//! None of them needs a MySQL server or network access.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Scratch directory with a secrets file and a backup directory.
struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn backup_dir(&self) -> PathBuf {
        self.path().join("backups")
    }

    fn secret_file(&self) -> PathBuf {
        self.path().join(".database_secret.json")
    }

    fn write_secrets(&self, json: &str) {
        fs::write(self.secret_file(), json).expect("failed to write secrets");
    }

    fn cmd(&self, bin: &str) -> Command {
        let mut cmd = Command::cargo_bin(bin).expect("failed to find binary");
        cmd.current_dir(self.path()).env_remove("DB_BACKUP_CONFIG");
        cmd
    }

    /// A local tool invoked with `-b <backups> -s <secretfile>`.
    fn local_cmd(&self, bin: &str) -> Command {
        let mut cmd = self.cmd(bin);
        cmd.arg("-b")
            .arg(self.backup_dir())
            .arg("-s")
            .arg(self.secret_file());
        cmd
    }

    fn backup_log(&self) -> String {
        fs::read_to_string(self.backup_dir().join("backuplog.log")).unwrap_or_default()
    }
}

#[test]
fn test_missing_secret_file_exits_255() {
    let env = TestEnv::new();

    env.local_cmd("mysql_backup")
        .arg("shop")
        .assert()
        .code(255)
        .stderr(predicate::str::contains("Secretfile"));

    let log = env.backup_log();
    assert!(log.contains("ERROR:"));
    assert!(log.contains("not found"));
}

#[test]
fn test_testlog_writes_info_and_error() {
    let env = TestEnv::new();
    env.write_secrets("{}");

    env.local_cmd("mysql_backup")
        .args(["--testlog", "shop"])
        .assert()
        .success();

    let log = env.backup_log();
    assert!(log.contains("INFO:"));
    assert!(log.contains("Test of logging capabilities for info messages"));
    assert!(log.contains("ERROR:"));
    assert!(log.contains("Test of logging capabilities for error messages"));
    // nothing was dumped
    let entries = fs::read_dir(env.backup_dir()).unwrap().count();
    assert_eq!(entries, 1);
}

#[test]
fn test_verbose_echoes_to_stdout() {
    let env = TestEnv::new();
    env.write_secrets("{}");

    env.local_cmd("zip_dirs")
        .args(["-v", "--testlog", "/srv/www"])
        .assert()
        .success()
        .stdout(predicate::str::contains("INFO:"))
        .stdout(predicate::str::contains(
            "Test of logging capabilities for error messages",
        ));

    // the file sink keeps logging alongside the echo
    assert!(env.backup_log().contains("INFO:"));
}

#[test]
fn test_missing_database_credentials_is_fatal() {
    let env = TestEnv::new();
    env.write_secrets(r#"{"SHOP_DB_PASS": "hunter2"}"#);

    env.local_cmd("mysql_backup")
        .arg("shop")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SHOP_DB_USER"))
        .stderr(predicate::str::contains("for help use --help"));
}

#[test]
fn test_missing_directory_is_ignored() {
    let env = TestEnv::new();
    // admin given but EMAIL_HOST missing: alerting off, backup still runs
    env.write_secrets(r#"{"EMAIL_PORT": "587"}"#);

    env.local_cmd("zip_dirs")
        .args(["-e", "admin@example.com", "-k", "0"])
        .arg(env.path().join("does-not-exist"))
        .assert()
        .success();

    let log = env.backup_log();
    assert!(log.contains("doesn't exist. Ignoring"));
    assert!(log.contains("Email alerting disabled"));
    assert!(!log.contains("ERROR:"));
}

#[cfg(unix)]
#[test]
fn test_zip_dirs_archives_and_links_current() {
    let env = TestEnv::new();
    env.write_secrets("{}");
    let source = env.path().join("www");
    fs::create_dir(&source).unwrap();
    fs::write(source.join("index.html"), b"<html/>").unwrap();

    env.local_cmd("zip_dirs")
        .args(["-k", "7"])
        .arg(&source)
        .assert()
        .success();

    let archives: Vec<_> = fs::read_dir(env.backup_dir())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tgz"))
        .collect();
    assert_eq!(archives.len(), 1);
    assert!(env.backup_dir().join("Current").join(&archives[0]).exists());
    assert!(env.backup_log().contains("tar'd and gzipped"));
}

#[test]
fn test_config_file_is_initialized() {
    let env = TestEnv::new();
    env.write_secrets("{}");
    let config = env.path().join("backup.toml");

    env.local_cmd("zip_dirs")
        .arg("--config")
        .arg(&config)
        .arg(env.path().join("does-not-exist"))
        .assert()
        .success();

    let written = fs::read_to_string(config).unwrap();
    assert!(written.contains("retry_delay_secs"));
    assert!(written.contains("drive_folder"));
}

#[test]
fn test_drive_backup_missing_key_file_is_fatal() {
    let env = TestEnv::new();
    env.write_secrets("{}");
    let log_file = env.path().join("drive.log");

    env.cmd("drive_backup")
        .arg("-l")
        .arg(&log_file)
        .arg("-s")
        .arg(env.secret_file())
        .arg("-k")
        .arg(env.path().join("absent-key.json"))
        .arg(env.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("absent-key.json"));

    let log = fs::read_to_string(log_file).unwrap();
    assert!(log.contains("ERROR:"));
}

#[test]
fn test_drive_backup_testlog_uses_log_file() {
    let env = TestEnv::new();
    env.write_secrets("{}");
    let log_file = env.path().join("drive.log");

    env.cmd("drive_backup")
        .arg("-l")
        .arg(&log_file)
        .arg("-s")
        .arg(env.secret_file())
        .args(["-t", "/srv/www"])
        .assert()
        .success();

    let log = fs::read_to_string(log_file).unwrap();
    assert!(log.contains("Test of logging capabilities for error messages"));
}

#[test]
fn test_targets_are_required() {
    let env = TestEnv::new();
    env.cmd("zip_dirs").assert().failure();
}
