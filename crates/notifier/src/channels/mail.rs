use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use beacon_common::error::Result;
use beacon_common::types::{Channel, DeliveryOutcome, Recipient};

use super::NotificationChannel;
use crate::notification::{MailMessage, Notification};

/// Templated mail delivery, provided by the surrounding application.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(
        &self,
        address: &str,
        recipient: &Recipient,
        message: &MailMessage,
    ) -> Result<()>;
}

/// Mail channel. Digest deferral is applied by the dispatcher before this runs.
pub struct MailChannel {
    mailer: Arc<dyn Mailer>,
}

impl MailChannel {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl NotificationChannel for MailChannel {
    fn channel(&self) -> Channel {
        Channel::Mail
    }

    async fn deliver(
        &self,
        recipient: &Recipient,
        notification: &dyn Notification,
    ) -> Result<DeliveryOutcome> {
        let Some(renderable) = notification.as_mail() else {
            return Ok(DeliveryOutcome::SkippedNoCapability);
        };

        let Some(address) = recipient.email_address() else {
            debug!(recipient_id = %recipient.id, "No mail address, skipping mail");
            return Ok(DeliveryOutcome::SkippedNoConfig);
        };

        let Some(message) = renderable.to_mail(recipient)? else {
            return Ok(DeliveryOutcome::SkippedEmptyMessage);
        };

        match self.mailer.send_mail(address, recipient, &message).await {
            Ok(()) => {
                debug!(
                    recipient_id = %recipient.id,
                    notification = notification.kind(),
                    "Mail sent"
                );
                Ok(DeliveryOutcome::Delivered)
            }
            Err(e) => {
                warn!(
                    recipient_id = %recipient.id,
                    notification = notification.kind(),
                    error = %e,
                    "Mail delivery failed"
                );
                Ok(DeliveryOutcome::Failed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::MailRenderable;
    use beacon_common::error::NotifyError;
    use std::sync::Mutex;
    use uuid::Uuid;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_mail(
            &self,
            address: &str,
            _recipient: &Recipient,
            message: &MailMessage,
        ) -> Result<()> {
            if self.fail {
                return Err(NotifyError::Other("smtp unavailable".to_string()));
            }
            self.sent
                .lock()
                .unwrap()
                .push((address.to_string(), message.subject.clone()));
            Ok(())
        }
    }

    struct TicketMail {
        empty: bool,
    }

    impl MailRenderable for TicketMail {
        fn to_mail(&self, _recipient: &Recipient) -> Result<Option<MailMessage>> {
            if self.empty {
                return Ok(None);
            }
            Ok(Some(MailMessage::new("Ticket #12 updated", "mail.ticket-updated")))
        }
    }

    impl Notification for TicketMail {
        fn kind(&self) -> &str {
            "ticket_updated"
        }

        fn as_mail(&self) -> Option<&dyn MailRenderable> {
            Some(self)
        }
    }

    struct NoMail;

    impl Notification for NoMail {
        fn kind(&self) -> &str {
            "discord_only"
        }
    }

    fn recipient_with_email() -> Recipient {
        let mut r = Recipient::new(Uuid::new_v4(), "mailer");
        r.email = Some("mailer@example.com".to_string());
        r
    }

    #[tokio::test]
    async fn test_mail_delivered() {
        let mailer = Arc::new(RecordingMailer::default());
        let channel = MailChannel::new(mailer.clone());

        let outcome = channel
            .deliver(&recipient_with_email(), &TicketMail { empty: false })
            .await
            .unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "mailer@example.com");
    }

    #[tokio::test]
    async fn test_mail_skips() {
        let channel = MailChannel::new(Arc::new(RecordingMailer::default()));

        let outcome = channel
            .deliver(&recipient_with_email(), &NoMail)
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::SkippedNoCapability);

        let outcome = channel
            .deliver(&recipient_with_email(), &TicketMail { empty: true })
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::SkippedEmptyMessage);

        let no_address = Recipient::new(Uuid::new_v4(), "nobody");
        let outcome = channel
            .deliver(&no_address, &TicketMail { empty: false })
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::SkippedNoConfig);
    }

    #[tokio::test]
    async fn test_mailer_error_becomes_failed_outcome() {
        let channel = MailChannel::new(Arc::new(RecordingMailer {
            fail: true,
            ..Default::default()
        }));

        let outcome = channel
            .deliver(&recipient_with_email(), &TicketMail { empty: false })
            .await
            .unwrap();

        assert!(matches!(outcome, DeliveryOutcome::Failed(reason) if reason.contains("smtp")));
    }
}
