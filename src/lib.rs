//! Library behind the `mysql_backup`, `zip_dirs` and `drive_backup` tools.
//!
//! Each tool reads credentials from a JSON secrets file, backs up a list of
//! targets one after another and prunes artifacts older than a retention
//! window. The backup modules are located in the [`backends`] module.
//! Error level log records can be mailed to an admin, see [`logging`].

#![forbid(unsafe_code)]

pub mod app;
pub mod backends;
pub mod cli;
pub mod config;
pub mod logging;
pub mod notify;
pub mod remote;
pub mod secrets;
pub mod util;
