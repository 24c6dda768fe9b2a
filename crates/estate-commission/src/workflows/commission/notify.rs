use std::sync::{Arc, Mutex};

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use crate::config::{SmtpConfig, SmtpTls};

/// Outbound e-mail produced by an invoice transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery hook for transition e-mails. Failures are reported back but never undo a
/// committed transition.
pub trait NotificationDispatcher: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport failed: {0}")]
    Transport(String),
    #[error("`{address}` is not a deliverable mail address")]
    InvalidAddress { address: String },
}

/// Writes each notification to the log instead of a mail relay.
#[derive(Debug, Clone)]
pub struct TracingNotifier {
    from_name: String,
}

impl TracingNotifier {
    pub fn new(from_name: impl Into<String>) -> Self {
        Self {
            from_name: from_name.into(),
        }
    }
}

impl NotificationDispatcher for TracingNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            from = %self.from_name,
            to = %notification.to,
            subject = %notification.subject,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Delivers notifications through an SMTP relay.
///
/// `send` only builds the message; delivery runs on the tokio runtime so a slow relay
/// never holds up the invoice transition that produced the mail.
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn from_config(smtp: &SmtpConfig, from_name: &str) -> Result<Self, NotifyError> {
        let address = smtp
            .from_email
            .parse::<Address>()
            .map_err(|_| NotifyError::InvalidAddress {
                address: smtp.from_email.clone(),
            })?;
        let from = Mailbox::new(Some(from_name.to_string()), address);

        let builder = match smtp.tls {
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
                .map_err(|error| NotifyError::Transport(error.to_string()))?,
            SmtpTls::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
                .map_err(|error| NotifyError::Transport(error.to_string()))?,
            SmtpTls::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host),
        };
        let mut builder = builder.port(smtp.port).timeout(Some(smtp.timeout));
        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        let to = notification
            .to
            .parse::<Mailbox>()
            .map_err(|_| NotifyError::InvalidAddress {
                address: notification.to.clone(),
            })?;
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|error| NotifyError::Transport(error.to_string()))
    }
}

impl NotificationDispatcher for SmtpNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let message = self.message(&notification)?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| NotifyError::Transport("no async runtime for SMTP delivery".to_string()))?;

        let transport = self.transport.clone();
        let Notification { to, subject, .. } = notification;
        runtime.spawn(async move {
            match transport.send(message).await {
                Ok(_) => tracing::info!(%to, %subject, "notification delivered"),
                Err(error) => tracing::warn!(%to, %subject, %error, "smtp delivery failed"),
            }
        });
        Ok(())
    }
}

/// Keeps every notification in memory; the demo and tests read them back.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .map_err(|_| NotifyError::Transport("recorder mutex poisoned".to_string()))?
            .push(notification);
        Ok(())
    }
}
