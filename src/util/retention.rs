//! Age based deletion of backup artifacts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const SECONDS_PER_DAY: u64 = 86_400;

/// Subtracted from the current time so an artifact created by the running
/// job survives a threshold of zero days.
pub const FUDGE: Duration = Duration::from_secs(1);

/// Configure how many days of backups to keep.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum KeepDays {
    /// Never delete anything.
    #[default]
    All,
    /// Delete artifacts that are at least this many days old.
    Days(u64),
}

impl From<i64> for KeepDays {
    /// Negative values keep every artifact.
    fn from(days: i64) -> Self {
        u64::try_from(days).map_or(KeepDays::All, KeepDays::Days)
    }
}

impl KeepDays {
    /// Returns if an artifact last modified at `modified` is due for deletion.
    pub fn is_expired(&self, modified: SystemTime, now: SystemTime) -> bool {
        let KeepDays::Days(days) = *self else {
            return false;
        };

        let reference = now.checked_sub(FUDGE).unwrap_or(now);
        match reference.duration_since(modified) {
            Ok(age) => age >= Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY)),
            // modified in the future
            Err(_) => false,
        }
    }
}

/// Outcome of a sweep over one prefix.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// The artifacts of one backup target: regular files in `dir` whose name
/// starts with `prefix` (and ends with the suffix, if one is set).
#[derive(Debug, Clone)]
pub struct RetentionSweep<'a> {
    dir: &'a Path,
    prefix: &'a str,
    suffix: Option<&'a str>,
}

impl<'a> RetentionSweep<'a> {
    pub fn new(dir: &'a Path, prefix: &'a str) -> Self {
        Self {
            dir,
            prefix,
            suffix: None,
        }
    }

    /// Restricts the sweep to names ending with `suffix`.
    pub fn suffix(mut self, suffix: &'a str) -> Self {
        self.suffix = Some(suffix);
        self
    }

    fn is_candidate(&self, name: &str) -> bool {
        name.starts_with(self.prefix) && self.suffix.is_none_or(|suffix| name.ends_with(suffix))
    }

    /// Lists matching regular files.
    pub fn artifacts(&self) -> io::Result<Vec<PathBuf>> {
        let mut artifacts = Vec::new();
        for entry in fs::read_dir(self.dir)? {
            let entry = entry?;
            if !self.is_candidate(&entry.file_name().to_string_lossy()) {
                continue;
            }
            if entry.file_type()?.is_file() {
                artifacts.push(entry.path());
            }
        }
        artifacts.sort();

        Ok(artifacts)
    }

    /// Deletes every artifact older than `keep`.
    ///
    /// Failing deletions are logged and skipped.
    pub fn sweep(&self, keep: KeepDays, now: SystemTime) -> io::Result<SweepReport> {
        if keep == KeepDays::All {
            log::trace!(target: "retention", "Keeping all artifacts starting with '{}'", self.prefix);
            return Ok(SweepReport::default());
        }

        self.remove_where(|path| {
            let modified = fs::metadata(path)?.modified()?;
            Ok(keep.is_expired(modified, now))
        })
    }

    /// Deletes every artifact regardless of its age.
    pub fn purge(&self) -> io::Result<SweepReport> {
        self.remove_where(|_| Ok(true))
    }

    fn remove_where(
        &self,
        mut expired: impl FnMut(&Path) -> io::Result<bool>,
    ) -> io::Result<SweepReport> {
        let mut report = SweepReport::default();

        for artifact in self.artifacts()? {
            match expired(&artifact) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    log::error!(target: "retention", "Unable to read modification time of {}: {e}", artifact.display());
                    report.failed.push(artifact);
                    continue;
                }
            }

            log::debug!(target: "retention", "Deleting {}", artifact.display());
            match fs::remove_file(&artifact) {
                Ok(()) => report.removed.push(artifact),
                Err(e) => {
                    log::error!(target: "retention", "Unable to remove file {}: {e}", artifact.display());
                    report.failed.push(artifact);
                }
            }
        }

        Ok(report)
    }
}
