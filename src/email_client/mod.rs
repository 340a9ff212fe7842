mod postmark;
mod smtp;

pub use postmark::PostmarkEmailClient;
pub use smtp::SmtpEmailClient;

use crate::domain::{Recipient, SubscriberEmail};
use async_trait::async_trait;

/// Outbound email.
///
/// `send_bulk` splits `recipients` into batches itself and never lets one
/// recipient see another's address. Every message carries its recipient's
/// own unsubscribe link. Either every batch is accepted or an error is
/// returned.
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send_bulk(
        &self,
        recipients: &[Recipient],
        subject: &str,
        html_body: &str,
    ) -> Result<(), anyhow::Error>;

    /// A single transactional message, e.g. the verification email.
    async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<(), anyhow::Error>;
}

/// `unsubscribe_url` with the recipient's token in the query string.
pub fn unsubscribe_link(unsubscribe_url: &str, recipient: &Recipient) -> String {
    format!("{}?token={}", unsubscribe_url, recipient.unsubscribe_token)
}

pub fn with_unsubscribe_footer(html_body: &str, unsubscribe_link: &str) -> String {
    format!(
        "{}\
        <hr />\
        <p style=\"font-size:12px;color:#666666\">\
        You are receiving this email because you subscribed to our newsletter. \
        <a href=\"{}\">Unsubscribe</a>\
        </p>",
        html_body, unsubscribe_link
    )
}

pub(crate) fn batches<T>(recipients: &[T], batch_size: usize) -> std::slice::Chunks<'_, T> {
    recipients.chunks(batch_size.max(1))
}
