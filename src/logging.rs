//! Log file, optional console echo and admin mail alerts.
//!
//! Every record is written as `LEVEL:YYYY-MM-DD HH:MM:SS,mmm message`.
//! Records at or above the alert threshold (error by default) are
//! additionally mailed once a [Mailer] is attached to the [AlertHandle].

use std::cell::Cell;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Local;
use derive_more::{Display, Error};
use env_logger::Target;
use log::{LevelFilter, Log, Metadata, Record};

use crate::notify::Mailer;

/// Crates whose records are only of interest when something broke.
const QUIET_MODULES: &[&str] = &["reqwest", "hyper", "hyper_util", "rustls", "h2"];

/// Errors on setting up logging.
#[derive(Debug, Display, Error)]
pub enum LoggingError {
    #[display("unable to open log file {}: {source}", path.display())]
    OpenLogFile { path: PathBuf, source: io::Error },
    #[display("logger already initialized")]
    AlreadyInitialized(log::SetLoggerError),
}

/// Where and how verbosely to log.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub file: PathBuf,
    pub level: LevelFilter,
    /// Echo every record to stdout as well.
    pub echo: bool,
}

/// Formats a record the way it appears in the log file and alert mails.
pub fn format_record(record: &Record) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
    format!("{}:{timestamp} {}", record.level(), record.args())
}

fn sink(level: LevelFilter, target: Target) -> env_logger::Logger {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(level)
        .format(|buf, record| writeln!(buf, "{}", format_record(record)))
        .target(target);
    for module in QUIET_MODULES {
        builder.filter_module(module, LevelFilter::Error);
    }

    builder.build()
}

struct Alerts {
    mailer: Box<dyn Mailer>,
    subject: String,
    threshold: LevelFilter,
}

/// Shared switch for mail alerts of the installed logger.
#[derive(Clone, Default)]
pub struct AlertHandle {
    alerts: Arc<RwLock<Option<Alerts>>>,
}

thread_local! {
    static SENDING: Cell<bool> = const { Cell::new(false) };
}

impl AlertHandle {
    /// Starts mailing error records with `subject`.
    pub fn enable(&self, mailer: Box<dyn Mailer>, subject: impl Into<String>) {
        if let Ok(mut alerts) = self.alerts.write() {
            *alerts = Some(Alerts {
                mailer,
                subject: subject.into(),
                threshold: LevelFilter::Error,
            });
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.alerts.read().is_ok_and(|alerts| alerts.is_some())
    }

    /// Changes the lowest level that is mailed.
    pub fn set_threshold(&self, threshold: LevelFilter) {
        if let Ok(mut alerts) = self.alerts.write() {
            if let Some(alerts) = alerts.as_mut() {
                alerts.threshold = threshold;
            }
        }
    }

    pub fn set_subject(&self, subject: impl Into<String>) {
        if let Ok(mut alerts) = self.alerts.write() {
            if let Some(alerts) = alerts.as_mut() {
                alerts.subject = subject.into();
            }
        }
    }

    fn dispatch(&self, record: &Record) {
        // records emitted while a mail is sent must not trigger another one
        if SENDING.with(Cell::get) {
            return;
        }
        let Ok(alerts) = self.alerts.read() else {
            return;
        };
        let Some(alerts) = alerts.as_ref() else {
            return;
        };
        if record.level() > alerts.threshold {
            return;
        }

        SENDING.with(|sending| sending.set(true));
        let result = alerts.mailer.send(&alerts.subject, &format_record(record));
        SENDING.with(|sending| sending.set(false));

        if let Err(e) = result {
            eprintln!("Unable to send alert mail: {e}");
        }
    }
}

/// [Log] implementation combining the log file, console echo and alerts.
pub struct BackupLogger {
    sinks: Vec<env_logger::Logger>,
    alerts: AlertHandle,
}

impl BackupLogger {
    /// Opens the log file in append mode and builds the sinks.
    pub fn new(config: &LogConfig) -> Result<Self, LoggingError> {
        let file = open_log_file(&config.file)?;

        let mut sinks = vec![sink(config.level, Target::Pipe(Box::new(file)))];
        if config.echo {
            sinks.push(sink(config.level, Target::Stdout));
        }

        Ok(Self {
            sinks,
            alerts: AlertHandle::default(),
        })
    }

    pub fn alerts(&self) -> AlertHandle {
        self.alerts.clone()
    }

    fn max_level(&self) -> LevelFilter {
        self.sinks
            .iter()
            .map(env_logger::Logger::filter)
            .max()
            .unwrap_or(LevelFilter::Off)
    }

    /// Installs the logger as the global [log] backend.
    pub fn install(self) -> Result<AlertHandle, LoggingError> {
        let alerts = self.alerts();
        let max_level = self.max_level();

        log::set_boxed_logger(Box::new(self)).map_err(LoggingError::AlreadyInitialized)?;
        log::set_max_level(max_level);

        Ok(alerts)
    }
}

fn open_log_file(path: &Path) -> Result<std::fs::File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| LoggingError::OpenLogFile {
            path: path.to_path_buf(),
            source,
        })
}

impl Log for BackupLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.sinks.iter().any(|sink| sink.enabled(metadata))
    }

    fn log(&self, record: &Record) {
        let Some(file) = self.sinks.first() else {
            return;
        };
        if !file.matches(record) {
            return;
        }

        for sink in &self.sinks {
            sink.log(record);
        }
        self.alerts.dispatch(record);
    }

    fn flush(&self) {
        for sink in &self.sinks {
            sink.flush();
        }
    }
}

/// Sets up logging for one tool run.
pub fn init(config: &LogConfig) -> Result<AlertHandle, LoggingError> {
    BackupLogger::new(config)?.install()
}
