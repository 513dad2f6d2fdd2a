//! Transactional HTTP email API delivery channel (Mailgun)

use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::channels::{DeliveryReceipt, Sender};
use crate::error::{NotifierError, Result};
use crate::models::Recipient;

/// Mailgun messages API channel, regionalized between US and EU endpoints
#[derive(Debug, Clone)]
pub struct MailgunChannel {
    api_key: String,
    domain: String,
    eu_region: bool,
    sender: Sender,
    client: Client,
}

impl MailgunChannel {
    pub fn new(
        api_key: String,
        domain: String,
        eu_region: bool,
        sender: Sender,
    ) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            api_key,
            domain,
            eu_region,
            sender,
            client,
        })
    }

    fn endpoint(&self) -> String {
        let base = if self.eu_region {
            "https://api.eu.mailgun.net"
        } else {
            "https://api.mailgun.net"
        };
        format!("{}/v3/{}/messages", base, self.domain)
    }

    /// Post the message form-encoded; any non-2xx response is a failure
    /// surfaced with the response body.
    pub async fn send(
        &self,
        recipients: &[Recipient],
        subject: &str,
        html: &str,
    ) -> Result<DeliveryReceipt> {
        let (first, rest) = recipients.split_first().ok_or_else(|| {
            NotifierError::validation("recipients", "recipient list is empty")
        })?;

        let mut form = vec![
            ("from".to_string(), self.sender.display()),
            ("to".to_string(), first.email.clone()),
            ("subject".to_string(), subject.to_string()),
            ("html".to_string(), html.to_string()),
        ];
        if !rest.is_empty() {
            let bcc = rest
                .iter()
                .map(|r| r.email.as_str())
                .collect::<Vec<_>>()
                .join(",");
            form.push(("bcc".to_string(), bcc));
        }

        let response = self
            .client
            .post(self.endpoint())
            .basic_auth("api", Some(&self.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(NotifierError::api(format!(
                "mailgun responded {}: {}",
                status, body
            )));
        }

        let message_id = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from));

        info!(
            domain = %self.domain,
            eu_region = self.eu_region,
            recipients = recipients.len(),
            "notification sent via mail API"
        );

        Ok(DeliveryReceipt {
            message_id,
            method: "mailgun",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(eu: bool) -> MailgunChannel {
        MailgunChannel::new(
            "key-123".to_string(),
            "mg.example.org".to_string(),
            eu,
            Sender {
                email: "station@example.org".to_string(),
                name: "Station".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_selected_by_region() {
        assert_eq!(
            channel(false).endpoint(),
            "https://api.mailgun.net/v3/mg.example.org/messages"
        );
        assert_eq!(
            channel(true).endpoint(),
            "https://api.eu.mailgun.net/v3/mg.example.org/messages"
        );
    }

    #[tokio::test]
    async fn test_empty_recipients_fail_before_any_request() {
        let err = channel(false)
            .send(&[], "subject", "<p>body</p>")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("recipients"));
    }
}
