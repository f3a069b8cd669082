use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

use super::retention::RetentionSweep;

/// Makes `path` readable and writable by its owner only.
#[cfg(unix)]
pub fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
pub fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Errors on refreshing the link to the newest artifact.
#[derive(Debug, Display, Error)]
pub enum CurrentLinkError {
    /// The link directory exists but isn't a directory.
    #[display("unable to create {} directory, it already exists as a file", _0.display())]
    NotADirectory(#[error(ignore)] PathBuf),
    /// The link directory can't be created.
    #[display("unable to create {} directory: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },
    /// Listing or linking failed.
    #[display("unable to create link {}: {source}", link.display())]
    Link { link: PathBuf, source: io::Error },
}

/// Hard-links `artifact` into `current_dir` after removing older links that
/// share `prefix`.
///
/// Returns the path of the new link.
pub fn link_current(
    artifact: &Path,
    current_dir: &Path,
    prefix: &str,
) -> Result<PathBuf, CurrentLinkError> {
    if current_dir.exists() {
        if !current_dir.is_dir() {
            return Err(CurrentLinkError::NotADirectory(current_dir.to_path_buf()));
        }
    } else {
        fs::create_dir_all(current_dir).map_err(|source| CurrentLinkError::CreateDir {
            path: current_dir.to_path_buf(),
            source,
        })?;
    }

    let file_name = artifact.file_name().unwrap_or(artifact.as_os_str());
    let link = current_dir.join(file_name);

    // failed removals are logged by the sweep
    RetentionSweep::new(current_dir, prefix)
        .purge()
        .map_err(|source| CurrentLinkError::Link {
            link: link.clone(),
            source,
        })?;

    fs::hard_link(artifact, &link).map_err(|source| CurrentLinkError::Link {
        link: link.clone(),
        source,
    })?;

    Ok(link)
}
