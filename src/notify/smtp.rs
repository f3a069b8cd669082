use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

use super::{EmailSettings, MailError, Mailer};

/// Delivers alerts through an authenticated SMTP relay.
///
/// STARTTLS is used when `EMAIL_USE_TLS` is `True`, plain SMTP otherwise.
pub struct SmtpMailer {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &EmailSettings, admin: &str) -> Result<Self, MailError> {
        let credentials = Credentials::new(settings.user.clone(), settings.password.clone());
        let builder = if settings.use_tls {
            SmtpTransport::starttls_relay(&settings.host)?
        } else {
            SmtpTransport::builder_dangerous(&settings.host)
        };
        let transport = builder
            .port(settings.port()?)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from: settings.from.parse()?,
            to: admin.parse()?,
        })
    }
}

impl Mailer for SmtpMailer {
    fn send(&self, subject: &str, body: &str) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        self.transport.send(&message)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(use_tls: bool) -> EmailSettings {
        EmailSettings {
            host: "localhost".into(),
            port: "2525".into(),
            user: "alerts".into(),
            password: "password".into(),
            use_tls,
            from: "alerts@example.com".into(),
        }
    }

    #[test]
    fn test_new_parses_addresses() {
        assert!(SmtpMailer::new(&settings(false), "admin@example.com").is_ok());
        assert!(SmtpMailer::new(&settings(true), "admin@example.com").is_ok());
    }

    #[test]
    fn test_new_rejects_invalid_admin() {
        let err = SmtpMailer::new(&settings(false), "not an address")
            .err()
            .unwrap();
        assert!(matches!(err, MailError::Address(_)));
    }
}
