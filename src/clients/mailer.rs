use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment as AttachmentPart, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    config::Config,
    models::email::{DeliveryResult, OutboundEmail},
    utils::with_deadline,
};

/// Delivers composed emails. Failures are reported in the result, never raised.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, email: &OutboundEmail) -> DeliveryResult;

    fn name(&self) -> &'static str;

    async fn health_check(&self) -> Result<(), Error>;
}

pub struct SmtpMailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    host: String,
    timeout: Duration,
}

impl SmtpMailSender {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let mut builder = if config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                .map_err(|e| anyhow!("Failed to create SMTP relay: {}", e))?
                .port(config.smtp_port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
                .port(config.smtp_port)
        };

        if let (Some(username), Some(password)) = (&config.email_user, &config.email_password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let transport = builder.timeout(Some(config.mail_timeout())).build();

        info!(
            host = %config.smtp_host,
            port = config.smtp_port,
            tls = config.smtp_tls,
            "SMTP mail sender initialized"
        );

        Ok(Self {
            transport,
            from_address: config.sender_address(),
            host: config.smtp_host.clone(),
            timeout: config.mail_timeout(),
        })
    }

    fn build_message(&self, email: &OutboundEmail, message_id: &str) -> Result<Message, Error> {
        let from: Mailbox = format!("{} <{}>", email.from_name, self.from_address)
            .parse()
            .map_err(|e| anyhow!("Invalid from address: {}", e))?;

        let to: Mailbox = email
            .to
            .parse()
            .map_err(|e| anyhow!("Invalid recipient address '{}': {}", email.to, e))?;

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&email.subject)
            .message_id(Some(message_id.to_string()));

        let alternative = MultiPart::alternative()
            .singlepart(SinglePart::plain(email.text_body.clone()))
            .singlepart(SinglePart::html(email.html_body.clone()));

        if email.attachments.is_empty() {
            return builder
                .multipart(alternative)
                .map_err(|e| anyhow!("Failed to build email message: {}", e));
        }

        let mut mixed = MultiPart::mixed().multipart(alternative);

        for attachment in &email.attachments {
            let content_type = ContentType::parse(attachment.content_type()).map_err(|_| {
                anyhow!(
                    "Invalid content type '{}' for attachment '{}'",
                    attachment.content_type(),
                    attachment.filename
                )
            })?;

            mixed = mixed.singlepart(
                AttachmentPart::new(attachment.filename.clone())
                    .body(attachment.decoded_content()?, content_type),
            );
        }

        builder
            .multipart(mixed)
            .map_err(|e| anyhow!("Failed to build email message: {}", e))
    }

    fn new_message_id(&self) -> String {
        let domain = self
            .from_address
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("localhost");

        format!("<{}@{}>", Uuid::new_v4(), domain)
    }
}

#[async_trait]
impl MailSender for SmtpMailSender {
    async fn send(&self, email: &OutboundEmail) -> DeliveryResult {
        debug!(
            to = %email.to,
            subject = %email.subject,
            host = %self.host,
            attachments = email.attachments.len(),
            "Sending email via SMTP"
        );

        let message_id = self.new_message_id();

        let message = match self.build_message(email, &message_id) {
            Ok(message) => message,
            Err(e) => {
                error!(to = %email.to, error = %e, "Failed to build email");
                return DeliveryResult::Failed {
                    error: e.to_string(),
                };
            }
        };

        let sent = with_deadline(self.timeout, "SMTP send", async {
            self.transport
                .send(message)
                .await
                .map_err(|e| anyhow!("SMTP send failed: {}", e))
        })
        .await;

        match sent {
            Ok(_) => {
                info!(to = %email.to, message_id = %message_id, "Email accepted by SMTP server");
                DeliveryResult::Delivered { message_id }
            }
            Err(e) => {
                error!(to = %email.to, error = %e, "Failed to send email via SMTP");
                DeliveryResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn health_check(&self) -> Result<(), Error> {
        let reachable = with_deadline(self.timeout, "SMTP health check", async {
            self.transport
                .test_connection()
                .await
                .map_err(|e| anyhow!("SMTP connection test failed: {}", e))
        })
        .await?;

        if reachable {
            Ok(())
        } else {
            Err(anyhow!("SMTP server did not accept the connection test"))
        }
    }
}
