//! Internal relay delivery channel
//!
//! Sends through an unauthenticated relay on localhost, for deployments
//! where the host machine runs its own MTA. Same verify-then-send shape as
//! the SMTP channel, minus credentials.

use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::info;
use uuid::Uuid;

use crate::channels::{build_email, DeliveryReceipt, Sender};
use crate::error::{NotifierError, Result};
use crate::models::Recipient;

const RELAY_HOST: &str = "localhost";
const RELAY_PORT: u16 = 25;

/// Local relay channel
#[derive(Debug, Clone)]
pub struct RelayChannel {
    sender: Sender,
}

impl RelayChannel {
    pub fn new(sender: Sender) -> Self {
        Self { sender }
    }

    pub async fn send(
        &self,
        recipients: &[Recipient],
        subject: &str,
        html: &str,
    ) -> Result<DeliveryReceipt> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), RELAY_HOST);
        let message = build_email(&self.sender, recipients, subject, html, &message_id)?;

        // Plaintext on purpose: the relay only listens on the loopback.
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(RELAY_HOST)
            .port(RELAY_PORT)
            .build();

        if !transport.test_connection().await? {
            return Err(NotifierError::email(
                "local relay did not accept the connection",
            ));
        }

        transport.send(message).await?;

        info!(recipients = recipients.len(), "notification sent via local relay");

        Ok(DeliveryReceipt {
            message_id: Some(message_id),
            method: "relay",
        })
    }
}
