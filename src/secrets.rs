//! Credentials read from a JSON secrets file.
//!
//! The file is a flat object of string values:
//!
//! ```json
//! {
//!     "SHOP_DB_USER": "backup",
//!     "SHOP_DB_PASS": "hunter2",
//!     "EMAIL_HOST": "smtp.example.com",
//!     "EMAIL_PORT": "587",
//!     "EMAIL_USER": "alerts@example.com",
//!     "EMAIL_USE_TLS": "True",
//!     "EMAIL_PASS": "password",
//!     "EMAIL_FROM_USER": "alerts@example.com"
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

/// Errors on loading or reading the secrets file.
#[derive(Debug, Display, Error)]
pub enum SecretsError {
    /// The secrets file doesn't exist.
    #[display("Secretfile {} not found", _0.display())]
    NotFound(#[error(ignore)] PathBuf),
    /// The secrets file can't be read.
    #[display("Reading secretfile {} failed: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    /// The secrets file isn't a flat JSON object of strings.
    #[display("Secretfile {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A required key is absent.
    #[display("Set the {_0} environment variable in the secret file")]
    MissingKey(#[error(ignore)] String),
}

/// Immutable key value store of credentials.
#[derive(Clone, Default)]
pub struct Secrets {
    values: HashMap<String, String>,
}

// never print the values
impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("Secrets").field("keys", &keys).finish()
    }
}

impl From<HashMap<String, String>> for Secrets {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl Secrets {
    /// Loads the secrets file at `path`.
    pub fn load(path: &Path) -> Result<Self, SecretsError> {
        let content = fs::read(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                SecretsError::NotFound(path.to_path_buf())
            } else {
                SecretsError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let values = serde_json::from_slice(&content).map_err(|source| SecretsError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!(target: "secrets", "Loaded secrets from {}", path.display());

        Ok(Self { values })
    }

    /// Returns the value stored for `key`.
    pub fn get(&self, key: &str) -> Result<&str, SecretsError> {
        self.values
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| SecretsError::MissingKey(key.to_string()))
    }

    /// Looks up `<DATABASE>_DB_USER` and `<DATABASE>_DB_PASS`.
    pub fn db_credentials(&self, database: &str) -> Result<DbCredentials, SecretsError> {
        let prefix = database.to_uppercase();
        let user = self.get(&format!("{prefix}_DB_USER"))?.to_string();
        let password = self.get(&format!("{prefix}_DB_PASS"))?.to_string();

        Ok(DbCredentials { user, password })
    }
}

/// MySQL login of one database.
#[derive(Clone, PartialEq, Eq)]
pub struct DbCredentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for DbCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbCredentials")
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn secrets(pairs: &[(&str, &str)]) -> Secrets {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>()
            .into()
    }

    #[test]
    fn test_load_secrets_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".database_secret.json");
        fs::write(&path, r#"{"SHOP_DB_USER": "backup", "SHOP_DB_PASS": "hunter2"}"#).unwrap();

        let secrets = Secrets::load(&path).unwrap();
        assert_eq!(secrets.get("SHOP_DB_USER").unwrap(), "backup");
    }

    #[test]
    fn test_load_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = Secrets::load(&tmp.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, SecretsError::NotFound(_)));
    }

    #[test]
    fn test_load_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("secrets.json");
        fs::write(&path, r#"{"EMAIL_PORT": 587}"#).unwrap();

        let err = Secrets::load(&path).unwrap_err();
        assert!(matches!(err, SecretsError::Malformed { .. }));
    }

    #[test]
    fn test_missing_key_message() {
        let err = Secrets::default().get("EMAIL_HOST").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Set the EMAIL_HOST environment variable in the secret file"
        );
    }

    #[test]
    fn test_db_credentials_use_uppercase_name() {
        let secrets = secrets(&[("SHOP_DB_USER", "backup"), ("SHOP_DB_PASS", "hunter2")]);

        let credentials = secrets.db_credentials("shop").unwrap();
        assert_eq!(credentials.user, "backup");
        assert_eq!(credentials.password, "hunter2");
    }

    #[test]
    fn test_db_credentials_missing_password() {
        let secrets = secrets(&[("SHOP_DB_USER", "backup")]);

        let err = secrets.db_credentials("shop").unwrap_err();
        assert!(matches!(err, SecretsError::MissingKey(key) if key == "SHOP_DB_PASS"));
    }

    #[test]
    fn test_debug_hides_values() {
        let secrets = secrets(&[("SHOP_DB_PASS", "hunter2")]);
        let printed = format!("{secrets:?}");
        assert!(printed.contains("SHOP_DB_PASS"));
        assert!(!printed.contains("hunter2"));
    }
}
