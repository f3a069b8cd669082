use std::cell::RefCell;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, CONTENT_TYPE, LOCATION};

use super::auth::{AccessToken, ServiceAccountKey};
use super::{FileQuery, RemoteError, RemoteFile, RemoteStore, FOLDER_MIME_TYPE};

const SCOPE: &str = "https://www.googleapis.com/auth/drive";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FILE_FIELDS: &str = "id,name,mimeType,parents,modifiedTime";
const ARCHIVE_MIME_TYPE: &str = "application/gzip";
/// Applies to the content transfer only; API calls use the client timeout.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(6 * 3600);

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
    next_page_token: Option<String>,
}

/// Google Drive v3 accessed as a service account.
pub struct GoogleDrive {
    client: Client,
    key: ServiceAccountKey,
    token: RefCell<Option<AccessToken>>,
}

impl GoogleDrive {
    pub fn new(key: ServiceAccountKey) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;

        Ok(Self {
            client,
            key,
            token: RefCell::new(None),
        })
    }

    /// Reads the service account key from `key_file`.
    pub fn from_key_file(key_file: &Path) -> Result<Self, RemoteError> {
        Self::new(ServiceAccountKey::load(key_file)?)
    }

    fn bearer(&self) -> Result<String, RemoteError> {
        if let Some(token) = self.token.borrow().as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.token.clone());
        }

        let token = self.key.fetch_token(&self.client, SCOPE)?;
        let bearer = token.token.clone();
        *self.token.borrow_mut() = Some(token);

        Ok(bearer)
    }

    fn send(
        &self,
        method: &'static str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Response, RemoteError> {
        let response = request.bearer_auth(self.bearer()?).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                body: response.text().unwrap_or_default(),
            });
        }

        Ok(response)
    }

    fn create_folder(&self, name: &str) -> Result<RemoteFile, RemoteError> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
        });
        let request = self
            .client
            .post(FILES_URL)
            .query(&[("fields", FILE_FIELDS)])
            .json(&metadata);

        Ok(self.send("POST", FILES_URL, request)?.json()?)
    }
}

/// The session URI of a resumable upload.
fn session_uri(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LOCATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// `PUT` of the archive content into an upload session.
///
/// The file is streamed from disk, never read into memory as a whole.
fn content_request(
    client: &Client,
    session_uri: &str,
    path: &Path,
) -> Result<RequestBuilder, RemoteError> {
    let upload_error = |source| RemoteError::Upload {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(upload_error)?;
    let len = file.metadata().map_err(upload_error)?.len();

    Ok(client
        .put(session_uri)
        .timeout(UPLOAD_TIMEOUT)
        .header(CONTENT_TYPE, ARCHIVE_MIME_TYPE)
        .body(Body::sized(file, len)))
}

impl RemoteStore for GoogleDrive {
    fn ensure_folder(&self, name: &str) -> Result<RemoteFile, RemoteError> {
        let query = FileQuery::new().name(name).mime_type(FOLDER_MIME_TYPE);
        if let Some(folder) = self.list(&query)?.into_iter().next() {
            log::debug!(target: "remote::gdrive", "Using existing folder {name} ({})", folder.id);
            return Ok(folder);
        }

        let folder = self.create_folder(name)?;
        log::info!(target: "remote::gdrive", "Created folder {name} ({})", folder.id);

        Ok(folder)
    }

    fn upload(&self, folder_id: &str, path: &Path) -> Result<RemoteFile, RemoteError> {
        let len = path
            .metadata()
            .map_err(|source| RemoteError::Upload {
                path: path.to_path_buf(),
                source,
            })?
            .len();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id],
        });

        let request = self
            .client
            .post(UPLOAD_URL)
            .query(&[("uploadType", "resumable"), ("fields", FILE_FIELDS)])
            .header("X-Upload-Content-Type", ARCHIVE_MIME_TYPE)
            .header("X-Upload-Content-Length", len)
            .json(&metadata);
        let response = self.send("POST", UPLOAD_URL, request)?;
        let session = session_uri(response.headers())
            .ok_or_else(|| RemoteError::NoUploadSession(UPLOAD_URL.to_string()))?;
        log::debug!(target: "remote::gdrive", "Uploading {} ({len} bytes)", path.display());

        let request = content_request(&self.client, &session, path)?;
        let file: RemoteFile = self.send("PUT", UPLOAD_URL, request)?.json()?;
        log::debug!(target: "remote::gdrive", "Uploaded {} as {}", path.display(), file.id);

        Ok(file)
    }

    fn list(&self, query: &FileQuery) -> Result<Vec<RemoteFile>, RemoteError> {
        let q = query.to_string();
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        log::trace!(target: "remote::gdrive", "Listing files: {q}");

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .client
                .get(FILES_URL)
                .query(&[("q", q.as_str()), ("fields", fields.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileList = self.send("GET", FILES_URL, request)?.json()?;
            files.extend(page.files);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(files)
    }

    fn delete(&self, file_id: &str) -> Result<(), RemoteError> {
        let url = format!("{FILES_URL}/{file_id}");
        let request = self.client.delete(&url);
        self.send("DELETE", &url, request)?;
        log::debug!(target: "remote::gdrive", "Deleted file {file_id}");

        Ok(())
    }
}
