use crate::domain::{Recipient, SubscriberEmail};
use crate::email_client::{batches, unsubscribe_link, with_unsubscribe_footer, EmailTransport};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, Secret};
use std::time::Duration;

/// Postmark REST API client.
///
/// Bulk sends go through `/email/batch`: one request per batch, one message
/// per recipient inside it, each with that recipient's unsubscribe link.
pub struct PostmarkEmailClient {
    http_client: reqwest::Client,
    api_base_url: Url,
    sender: SubscriberEmail,
    auth_token: Secret<String>,
    batch_size: usize,
    unsubscribe_url: String,
}

impl PostmarkEmailClient {
    pub fn new(
        api_base_url: &str,
        sender: SubscriberEmail,
        auth_token: Secret<String>,
        timeout: Duration,
        batch_size: usize,
        unsubscribe_url: String,
    ) -> Result<Self, anyhow::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let api_base_url = Url::parse(api_base_url)
            .with_context(|| format!("Invalid email API base url {}", api_base_url))?;
        Ok(Self {
            http_client,
            api_base_url,
            sender,
            auth_token,
            batch_size,
            unsubscribe_url,
        })
    }

    async fn post<T: serde::Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<(), anyhow::Error> {
        let url = self
            .api_base_url
            .join(endpoint)
            .context("Invalid email API endpoint")?;
        self.http_client
            .post(url)
            .header("X-Postmark-Server-Token", self.auth_token.expose_secret())
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html_body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_body: Option<&'a str>,
    message_stream: &'a str,
}

#[async_trait]
impl EmailTransport for PostmarkEmailClient {
    #[tracing::instrument(
        name = "Send bulk email through Postmark",
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
            let bodies: Vec<String> = batch
                .iter()
                .map(|recipient| {
                    let link = unsubscribe_link(&self.unsubscribe_url, recipient);
                    with_unsubscribe_footer(html_body, &link)
                })
                .collect();
            let messages: Vec<SendEmailRequest> = batch
                .iter()
                .zip(&bodies)
                .map(|(recipient, body)| SendEmailRequest {
                    from: self.sender.as_ref(),
                    to: recipient.email.as_ref(),
                    subject,
                    html_body: body,
                    text_body: None,
                    message_stream: "broadcast",
                })
                .collect();
            self.post("email/batch", &messages)
                .await
                .with_context(|| format!("Failed to deliver email batch {}", index + 1))?;
        }
        Ok(())
    }

    #[tracing::instrument(name = "Send email through Postmark", skip_all)]
    async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<(), anyhow::Error> {
        let request = SendEmailRequest {
            from: self.sender.as_ref(),
            to: recipient.as_ref(),
            subject,
            html_body,
            text_body: Some(text_body),
            message_stream: "outbound",
        };
        self.post("email", &request).await
    }
}
