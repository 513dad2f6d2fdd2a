//! Authenticated SMTP delivery channel

use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;
use uuid::Uuid;

use crate::channels::{build_email, DeliveryReceipt, Sender};
use crate::error::{NotifierError, Result};
use crate::models::Recipient;

/// SMTP channel using the host/port/credentials from the delivery settings
#[derive(Debug, Clone)]
pub struct SmtpChannel {
    host: String,
    port: u16,
    username: String,
    password: String,
    sender: Sender,
}

impl SmtpChannel {
    pub fn new(
        host: String,
        port: u16,
        username: String,
        password: String,
        sender: Sender,
    ) -> Self {
        Self {
            host,
            port,
            username,
            password,
            sender,
        }
    }

    /// Verify the connection, then send with the first recipient as To and
    /// the remainder blind-copied via the envelope.
    pub async fn send(
        &self,
        recipients: &[Recipient],
        subject: &str,
        html: &str,
    ) -> Result<DeliveryReceipt> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.host);
        let message = build_email(&self.sender, recipients, subject, html, &message_id)?;

        let credentials = Credentials::new(self.username.clone(), self.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)?
            .port(self.port)
            .credentials(credentials)
            .build();

        if !transport.test_connection().await? {
            return Err(NotifierError::email(format!(
                "SMTP server {} did not accept the connection",
                self.host
            )));
        }

        transport.send(message).await?;

        info!(
            host = %self.host,
            recipients = recipients.len(),
            "notification sent via SMTP"
        );

        Ok(DeliveryReceipt {
            message_id: Some(message_id),
            method: "smtp",
        })
    }
}
