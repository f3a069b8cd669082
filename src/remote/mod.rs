//! Remote object store receiving directory archives.
//!
//! [RemoteStore] is the seam between the upload logic and the actual cloud
//! provider. [GoogleDrive] implements it on top of the Drive v3 REST API.

mod auth;
mod gdrive;

pub use auth::{AccessToken, ServiceAccountKey};
pub use gdrive::GoogleDrive;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use derive_more::{Display, Error, From};

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Errors of the remote store.
#[derive(Debug, Display, Error, From)]
pub enum RemoteError {
    /// The service account key can't be read.
    #[display("reading key file {} failed: {source}", path.display())]
    KeyFile { path: PathBuf, source: io::Error },
    /// The service account key isn't valid JSON of the expected shape.
    #[display("key file {} is malformed: {source}", path.display())]
    MalformedKey {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Signing the token request failed.
    #[display("signing the token request failed: {_0}")]
    #[from]
    Jwt(jsonwebtoken::errors::Error),
    /// The HTTP request couldn't be performed.
    #[display("request failed: {_0}")]
    #[from]
    Http(reqwest::Error),
    /// The API answered with an error status.
    #[display("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },
    /// A resumable upload was accepted without a session location.
    #[display("{_0} returned no upload session")]
    NoUploadSession(#[error(ignore)] String),
    /// The file to upload can't be read.
    #[display("reading {} failed: {source}", path.display())]
    Upload { path: PathBuf, source: io::Error },
}

/// Metadata of a file or folder in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub parents: Vec<String>,
    pub modified_time: Option<DateTime<Utc>>,
}

/// Operations needed to keep a folder of archives in the cloud.
pub trait RemoteStore {
    /// Returns the folder called `name`, creating it if absent.
    fn ensure_folder(&self, name: &str) -> Result<RemoteFile, RemoteError>;

    /// Uploads the file at `path` into the folder with id `folder_id`.
    fn upload(&self, folder_id: &str, path: &Path) -> Result<RemoteFile, RemoteError>;

    /// Lists all files matching `query`.
    fn list(&self, query: &FileQuery) -> Result<Vec<RemoteFile>, RemoteError>;

    /// Deletes the file with id `file_id`.
    fn delete(&self, file_id: &str) -> Result<(), RemoteError>;
}

/// Filter over remote files.
///
/// All given conditions must hold. Trashed files are excluded unless
/// [FileQuery::include_trashed] is called. The [Display] implementation
/// renders the filter in the Drive query language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    name: Option<String>,
    name_contains: Option<String>,
    mime_type: Option<String>,
    parent: Option<String>,
    modified_before: Option<DateTime<Utc>>,
    include_trashed: bool,
}

impl FileQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name_contains(mut self, fragment: impl Into<String>) -> Self {
        self.name_contains = Some(fragment.into());
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn parent(mut self, folder_id: impl Into<String>) -> Self {
        self.parent = Some(folder_id.into());
        self
    }

    pub fn modified_before(mut self, timestamp: DateTime<Utc>) -> Self {
        self.modified_before = Some(timestamp);
        self
    }

    pub fn include_trashed(mut self) -> Self {
        self.include_trashed = true;
        self
    }

    /// Evaluates the filter against `file` without asking the remote store.
    ///
    /// Trash state is unknown locally, so it is ignored. A file without a
    /// modification time never matches a `modified_before` condition.
    ///
    /// `name_contains` is a plain substring test here, while Drive treats
    /// `name contains` as a prefix match on the name. Both select every
    /// archive of a sanitized prefix, which always starts the name.
    pub fn matches(&self, file: &RemoteFile) -> bool {
        self.name.as_ref().is_none_or(|name| &file.name == name)
            && self
                .name_contains
                .as_ref()
                .is_none_or(|fragment| file.name.contains(fragment.as_str()))
            && self
                .mime_type
                .as_ref()
                .is_none_or(|mime_type| &file.mime_type == mime_type)
            && self
                .parent
                .as_ref()
                .is_none_or(|parent| file.parents.contains(parent))
            && self.modified_before.is_none_or(|before| {
                file.modified_time
                    .is_some_and(|modified| modified < before)
            })
    }
}

fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{escaped}'")
}

impl fmt::Display for FileQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut clauses = Vec::new();
        if let Some(name) = &self.name {
            clauses.push(format!("name = {}", quote(name)));
        }
        if let Some(fragment) = &self.name_contains {
            clauses.push(format!("name contains {}", quote(fragment)));
        }
        if let Some(mime_type) = &self.mime_type {
            clauses.push(format!("mimeType = {}", quote(mime_type)));
        }
        if let Some(parent) = &self.parent {
            clauses.push(format!("{} in parents", quote(parent)));
        }
        if let Some(before) = &self.modified_before {
            let before = before.to_rfc3339_opts(SecondsFormat::Micros, true);
            clauses.push(format!("modifiedTime < {}", quote(&before)));
        }
        if !self.include_trashed {
            clauses.push("trashed = false".to_string());
        }

        write!(f, "{}", clauses.join(" and "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file(name: &str, modified: Option<DateTime<Utc>>) -> RemoteFile {
        RemoteFile {
            id: format!("id-{name}"),
            name: name.to_string(),
            mime_type: "application/gzip".into(),
            parents: vec!["folder".into()],
            modified_time: modified,
        }
    }

    #[test]
    fn test_render_query() {
        let before = Utc.with_ymd_and_hms(2018, 12, 30, 8, 0, 0).unwrap();
        let query = FileQuery::new()
            .name_contains("_srv_www")
            .modified_before(before);

        assert_eq!(
            query.to_string(),
            "name contains '_srv_www' and modifiedTime < '2018-12-30T08:00:00.000000Z' and trashed = false"
        );
    }

    #[test]
    fn test_render_folder_query() {
        let query = FileQuery::new().name("Backup").mime_type(FOLDER_MIME_TYPE);
        assert_eq!(
            query.to_string(),
            "name = 'Backup' and mimeType = 'application/vnd.google-apps.folder' and trashed = false"
        );
    }

    #[test]
    fn test_render_escapes_quotes() {
        let query = FileQuery::new().name("Team's \\ backups").include_trashed();
        assert_eq!(query.to_string(), r"name = 'Team\'s \\ backups'");
    }

    #[test]
    fn test_matches_name_fragment_and_age() {
        let before = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let query = FileQuery::new()
            .name_contains("_srv_www")
            .modified_before(before);

        assert!(query.matches(&file("_srv_www.2023.tgz", Some(old))));
        assert!(!query.matches(&file("_srv_www.2024.tgz", Some(new))));
        assert!(!query.matches(&file("_srv_db.2023.tgz", Some(old))));
        assert!(!query.matches(&file("_srv_www.unknown.tgz", None)));
    }

    #[test]
    fn test_matches_parent() {
        let query = FileQuery::new().parent("folder");
        assert!(query.matches(&file("a", None)));
        assert!(!FileQuery::new().parent("other").matches(&file("a", None)));
    }

    #[test]
    fn test_deserialize_remote_file() {
        let json = r#"{
            "id": "1a2b",
            "name": "_srv_www.2018-12-30T08.00.00.000000.tgz",
            "mimeType": "application/gzip",
            "parents": ["0Bfolder"],
            "modifiedTime": "2018-12-30T08:00:05.123Z"
        }"#;

        let file: RemoteFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.id, "1a2b");
        assert_eq!(file.parents, vec!["0Bfolder".to_string()]);
        assert!(file.modified_time.is_some());
    }
}
