//! File names of backup artifacts.
//!
//! Every artifact name starts with the name of its target so that the
//! retention sweep can find all generations of one target by prefix.

use std::path::MAIN_SEPARATOR;

use chrono::{DateTime, TimeZone};

/// File name extension of directory archives.
pub const ARCHIVE_EXTENSION: &str = ".tgz";

/// Turns a directory path into a flat file name prefix.
///
/// `/var/www/html` becomes `_var_www_html`.
pub fn sanitize_target(target: &str) -> String {
    target.replace(MAIN_SEPARATOR, "_")
}

/// `<database>.<iso timestamp>.sql.gz`
pub fn dump_file_name<Tz: TimeZone>(database: &str, timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let timestamp = timestamp.format("%Y-%m-%dT%H:%M:%S%.6f");
    format!("{database}.{timestamp}.sql.gz")
}

/// `<prefix>.<iso timestamp>.tgz` with colons replaced by dots, since tar
/// treats `host:path` arguments as remote archives.
pub fn archive_file_name<Tz: TimeZone>(prefix: &str, timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    let timestamp = timestamp.format("%Y-%m-%dT%H.%M.%S%.6f");
    format!("{prefix}.{timestamp}{ARCHIVE_EXTENSION}")
}
