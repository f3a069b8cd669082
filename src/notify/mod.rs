//! Mail alerts to the admin.
//!
//! Alerts are sent by the [logger](crate::logging) for records at or above
//! the alert threshold. The SMTP account comes from the secrets file, see
//! [EmailSettings].

mod smtp;

pub use smtp::SmtpMailer;

use derive_more::{Display, Error, From};

use crate::secrets::{Secrets, SecretsError};

/// Errors on sending mails.
#[derive(Debug, Display, Error, From)]
pub enum MailError {
    /// The SMTP port isn't a number.
    #[display("invalid EMAIL_PORT '{_0}'")]
    InvalidPort(#[error(ignore)] String),
    /// A sender or receiver address can't be parsed.
    #[display("invalid mail address: {_0}")]
    #[from]
    Address(lettre::address::AddressError),
    /// The message can't be assembled.
    #[display("unable to build message: {_0}")]
    #[from]
    Message(lettre::error::Error),
    /// Delivery failed.
    #[display("SMTP delivery failed: {_0}")]
    #[from]
    Smtp(lettre::transport::smtp::Error),
}

/// Something that can deliver a message to the admin.
pub trait Mailer: Send + Sync {
    fn send(&self, subject: &str, body: &str) -> Result<(), MailError>;
}

/// SMTP account used for alerts.
#[derive(Clone, PartialEq, Eq)]
pub struct EmailSettings {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub use_tls: bool,
    pub from: String,
}

impl std::fmt::Debug for EmailSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("use_tls", &self.use_tls)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl EmailSettings {
    /// Reads the `EMAIL_*` keys. Any missing key is an error.
    pub fn from_secrets(secrets: &Secrets) -> Result<Self, SecretsError> {
        Ok(Self {
            host: secrets.get("EMAIL_HOST")?.to_string(),
            user: secrets.get("EMAIL_USER")?.to_string(),
            port: secrets.get("EMAIL_PORT")?.to_string(),
            use_tls: secrets.get("EMAIL_USE_TLS")? == "True",
            password: secrets.get("EMAIL_PASS")?.to_string(),
            from: secrets.get("EMAIL_FROM_USER")?.to_string(),
        })
    }

    pub fn port(&self) -> Result<u16, MailError> {
        self.port
            .trim()
            .parse()
            .map_err(|_| MailError::InvalidPort(self.port.clone()))
    }
}
