//! Creating compressed tarballs of directories.

use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::util::process::{self, CommandError};

/// Packs a directory into a single compressed file.
pub trait Archiver {
    fn archive(&self, source: &Path, destination: &Path) -> Result<(), CommandError>;
}

/// Runs `tar -czf <destination> <source>`.
#[derive(Debug, Clone, Default)]
pub struct TarArchiver;

impl Archiver for TarArchiver {
    fn archive(&self, source: &Path, destination: &Path) -> Result<(), CommandError> {
        let mut tar = Command::new("tar");
        tar.arg("-czf")
            .arg(destination)
            .arg(source)
            .stdin(Stdio::null());
        log::debug!(target: "backend::archive", "using command: {}", process::describe(&tar));

        process::run(&mut tar).map(|_| ())
    }
}

/// Archives `source`, retrying exactly once after `delay` if the first
/// attempt fails.
pub fn archive_with_retry(
    archiver: &dyn Archiver,
    source: &Path,
    destination: &Path,
    delay: Duration,
) -> Result<(), CommandError> {
    match archiver.archive(source, destination) {
        Ok(()) => Ok(()),
        Err(e) => {
            log::warn!(
                target: "backend::archive",
                "Archiving {} failed, retrying in {}s: {e}",
                source.display(),
                delay.as_secs()
            );
            thread::sleep(delay);
            archiver.archive(source, destination)
        }
    }
}
