use estate_commission::config::NotificationConfig;
use estate_commission::workflows::commission::{
    CommissionService, InMemoryInvoiceLedger, Notification, NotificationDispatcher, NotifyError,
    SmtpNotifier, SslCommerzGateway, TracingNotifier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Mail delivery chosen at startup: a real relay when SMTP is configured, the log otherwise.
pub(crate) enum LiveNotifier {
    Smtp(SmtpNotifier),
    Log(TracingNotifier),
}

impl LiveNotifier {
    pub(crate) fn from_config(config: &NotificationConfig) -> Result<Self, NotifyError> {
        match &config.smtp {
            Some(smtp) => Ok(Self::Smtp(SmtpNotifier::from_config(smtp, &config.from_name)?)),
            None => Ok(Self::Log(TracingNotifier::new(config.from_name.clone()))),
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Smtp(_) => "smtp",
            Self::Log(_) => "log",
        }
    }
}

impl NotificationDispatcher for LiveNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        match self {
            Self::Smtp(notifier) => notifier.send(notification),
            Self::Log(notifier) => notifier.send(notification),
        }
    }
}

/// The service as wired by `serve`: in-memory ledger, hosted gateway, configured mail.
pub(crate) type LiveCommissionService =
    CommissionService<InMemoryInvoiceLedger, SslCommerzGateway, LiveNotifier>;

#[cfg(test)]
mod tests {
    use super::*;
    use estate_commission::config::{SmtpConfig, SmtpTls};
    use std::time::Duration;

    #[test]
    fn logs_mail_without_a_relay() {
        let notifier = LiveNotifier::from_config(&NotificationConfig::default()).expect("builds");
        assert_eq!(notifier.kind(), "log");
        assert!(notifier
            .send(Notification {
                to: "admin@example.com".to_string(),
                subject: "Commission proof submitted".to_string(),
                body: "Seller #10 submitted a payment.".to_string(),
            })
            .is_ok());
    }

    #[test]
    fn uses_the_relay_when_configured() {
        let config = NotificationConfig {
            smtp: Some(SmtpConfig {
                host: "smtp.example.com".to_string(),
                port: 587,
                tls: SmtpTls::StartTls,
                username: Some("mailer".to_string()),
                password: Some("app-password".to_string()),
                from_email: "noreply@example.com".to_string(),
                timeout: Duration::from_secs(15),
            }),
            ..NotificationConfig::default()
        };
        let notifier = LiveNotifier::from_config(&config).expect("builds");
        assert_eq!(notifier.kind(), "smtp");
    }
}
