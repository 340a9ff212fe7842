use crate::domain::{Recipient, SubscriberEmail};
use crate::email_client::{batches, unsubscribe_link, with_unsubscribe_footer, EmailTransport};
use anyhow::Context;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

/// SMTP relay client.
///
/// Bulk sends write one message per recipient, each carrying its own
/// unsubscribe link.
pub struct SmtpEmailClient {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    batch_size: usize,
    unsubscribe_url: String,
}

impl SmtpEmailClient {
    pub fn new(
        host: &str,
        port: u16,
        sender: &SubscriberEmail,
        password: Secret<String>,
        timeout: Duration,
        batch_size: usize,
        unsubscribe_url: String,
    ) -> Result<Self, anyhow::Error> {
        let credentials = Credentials::new(
            sender.as_ref().to_string(),
            password.expose_secret().to_string(),
        );
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .with_context(|| format!("Failed to configure SMTP relay {}", host))?
            .port(port)
            .credentials(credentials)
            .timeout(Some(timeout))
            .build();
        Ok(Self {
            transport,
            sender: mailbox(sender)?,
            batch_size,
            unsubscribe_url,
        })
    }
}

fn mailbox(email: &SubscriberEmail) -> Result<Mailbox, anyhow::Error> {
    email
        .as_ref()
        .parse::<Mailbox>()
        .with_context(|| format!("{} is not a valid mailbox", email))
}

fn campaign_message(
    sender: &Mailbox,
    recipient: &SubscriberEmail,
    subject: &str,
    html_body: String,
) -> Result<Message, anyhow::Error> {
    Message::builder()
        .from(sender.clone())
        .to(mailbox(recipient)?)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(html_body)
        .context("Failed to build email message")
}

#[async_trait]
impl EmailTransport for SmtpEmailClient {
    #[tracing::instrument(
        name = "Send bulk email through SMTP",
        skip(self, recipients, html_body),
        fields(recipients = recipients.len())
    )]
    async fn send_bulk(
        &self,
        recipients: &[Recipient],
        subject: &str,
        html_body: &str,
    ) -> Result<(), anyhow::Error> {
        for (index, batch) in batches(recipients, self.batch_size).enumerate() {
            for recipient in batch {
                let link = unsubscribe_link(&self.unsubscribe_url, recipient);
                let message = campaign_message(
                    &self.sender,
                    &recipient.email,
                    subject,
                    with_unsubscribe_footer(html_body, &link),
                )?;
                self.transport
                    .send(message)
                    .await
                    .with_context(|| format!("Failed to deliver email batch {}", index + 1))?;
            }
        }
        Ok(())
    }

    #[tracing::instrument(name = "Send email through SMTP", skip_all)]
    async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<(), anyhow::Error> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(mailbox(recipient)?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text_body.to_string(),
                html_body.to_string(),
            ))
            .context("Failed to build email message")?;
        self.transport
            .send(message)
            .await
            .context("Failed to send email")?;
        Ok(())
    }
}
