use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{info, trace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Outbound mail collaborator.
pub trait Mailer: Send + Sync {
    fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// Writes mail to the log instead of an SMTP relay.
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

impl Mailer for LogMailer {
    fn send(&self, mail: Mail) -> Result<(), MailError> {
        // Bodies carry live tokens.
        info!("Mail from {} to {}: {}", self.from, mail.to, mail.subject);
        trace!("Mail body for {}: {}", mail.to, mail.body);
        Ok(())
    }
}

/// Keeps every mail in memory.
#[derive(Clone, Default)]
pub struct MemoryMailer {
    sent: Arc<Mutex<Vec<Mail>>>,
}

impl MemoryMailer {
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }
}

impl Mailer for MemoryMailer {
    fn send(&self, mail: Mail) -> Result<(), MailError> {
        self.sent
            .lock()
            .map_err(|_| MailError("mailbox lock poisoned".into()))?
            .push(mail);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn log_mailer_keeps_body_out_of_debug_logs() {
        let logs = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            LogMailer::new("no-reply@matcha.local")
                .send(Mail {
                    to: "ada@example.com".into(),
                    subject: "Reset your Matcha password".into(),
                    body: "Choose a new password: http://localhost/reset?token=live-token".into(),
                })
                .unwrap();
        });

        let out = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(out.contains("ada@example.com"));
        assert!(out.contains("Reset your Matcha password"));
        assert!(!out.contains("live-token"));
    }

    #[test]
    fn memory_mailer_records_mail() {
        let mailer = MemoryMailer::default();
        let mail = Mail {
            to: "ada@example.com".into(),
            subject: "hi".into(),
            body: "body".into(),
        };
        mailer.send(mail.clone()).unwrap();
        assert_eq!(mailer.sent(), vec![mail]);
    }
}
