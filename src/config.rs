//! Optional tool settings read from a TOML file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use derive_more::{Display, Error};

/// Tunables that rarely change between runs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds to wait before retrying a failed archive command.
    pub retry_delay_secs: u64,

    /// Name of the directory inside the backup directory that links the
    /// newest archive of every directory target.
    pub current_dir_name: String,

    /// Where archives are built before they are uploaded.
    pub staging_dir: PathBuf,

    /// Remote folder receiving uploaded archives.
    pub drive_folder: String,

    /// Subject of alert mails.
    pub error_subject: String,

    /// Subject of the upload summary mail.
    pub summary_subject: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            retry_delay_secs: 5,
            current_dir_name: "Current".into(),
            staging_dir: std::env::temp_dir(),
            drive_folder: "Backup".into(),
            error_subject: "Problem with database backup!!!".into(),
            summary_subject: "Database backup to Google Drive Information!!!".into(),
        }
    }
}

/// Errors on reading the settings file.
#[derive(Debug, Display, Error)]
pub enum SettingsError {
    #[display("Reading the config file {} failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[display("Parsing the config file {} failed: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Settings {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Reads the settings at `path`.
    ///
    /// If the file doesn't exist yet the defaults are written there and used.
    pub fn load_or_init(path: &Path) -> Result<Self, SettingsError> {
        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(
                    "Writing default config to {} because it doesn't exist yet",
                    path.display()
                );
                let settings = Settings::default();
                match toml::to_string_pretty(&settings) {
                    Ok(content) => {
                        if let Err(e) = fs::write(path, content) {
                            log::warn!("Writing default config to {} failed {e}", path.display());
                        }
                    }
                    Err(e) => log::warn!("Serializing the default config failed: {e}"),
                }

                Ok(settings)
            }
            Err(source) => Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Like [Settings::load_or_init] but falls back to the defaults when no
    /// path is given.
    pub fn resolve(path: Option<&Path>) -> Result<Self, SettingsError> {
        path.map_or_else(|| Ok(Settings::default()), Settings::load_or_init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("backup.toml");

        let settings = Settings::load_or_init(&path).unwrap();
        assert_eq!(settings, Settings::default());

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("retry_delay_secs = 5"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("backup.toml");
        fs::write(&path, "retry_delay_secs = 0\ndrive_folder = \"Nightly\"\n").unwrap();

        let settings = Settings::load_or_init(&path).unwrap();
        assert_eq!(settings.retry_delay(), Duration::ZERO);
        assert_eq!(settings.drive_folder, "Nightly");
        assert_eq!(settings.current_dir_name, "Current");
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("backup.toml");
        fs::write(&path, "retry_delay_secs = \"soon\"").unwrap();

        let err = Settings::load_or_init(&path).unwrap_err();
        assert!(matches!(err, SettingsError::Parse { .. }));
    }

    #[test]
    fn test_no_path_uses_defaults() {
        assert_eq!(Settings::resolve(None).unwrap(), Settings::default());
    }
}
