//! Delivery channels for show notifications
//!
//! Channel selection is data-driven from the `method` column of the delivery
//! settings record:
//! - `smtp` — authenticated SMTP relay ([`SmtpChannel`])
//! - `mailgun` — transactional HTTP email API, regionalized ([`MailgunChannel`])
//! - `relay` — unauthenticated relay on localhost ([`RelayChannel`])
//! - `gmail_api` — OAuth mail, a real always-failing stub ([`GmailApiChannel`])
//!
//! Every channel addresses the first recipient as To and the remainder as
//! Bcc, so no recipient ever sees the full audience list.

use lettre::address::Envelope;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::{Address, Message};

use crate::error::{NotifierError, Result};
use crate::models::{DeliveryMethod, DeliverySettings, Recipient};

pub mod gmail;
pub mod mailgun;
pub mod relay;
pub mod smtp;

pub use gmail::GmailApiChannel;
pub use mailgun::MailgunChannel;
pub use relay::RelayChannel;
pub use smtp::SmtpChannel;

/// Result of a successful channel send
#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
    pub method: &'static str,
}

/// Sender identity shared by all channels
#[derive(Debug, Clone)]
pub struct Sender {
    pub email: String,
    pub name: String,
}

impl Sender {
    /// Build the From mailbox for outgoing messages.
    pub fn mailbox(&self) -> Result<Mailbox> {
        let raw = if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        };
        raw.parse::<Mailbox>()
            .map_err(|e| NotifierError::email(format!("invalid sender address: {}", e)))
    }

    /// Display form used by the HTTP API channel.
    pub fn display(&self) -> String {
        if self.name.is_empty() {
            self.email.clone()
        } else {
            format!("{} <{}>", self.name, self.email)
        }
    }
}

/// A concrete delivery channel, selected and validated from the settings row
#[derive(Debug, Clone)]
pub enum DeliveryChannel {
    Smtp(SmtpChannel),
    Mailgun(MailgunChannel),
    Relay(RelayChannel),
    GmailApi(GmailApiChannel),
}

impl DeliveryChannel {
    /// Select and validate a channel from the delivery settings record.
    ///
    /// Fails with a configuration error naming every missing required field;
    /// no network activity happens here.
    pub fn from_settings(settings: &DeliverySettings) -> Result<Self> {
        let method = DeliveryMethod::parse(&settings.method)?;

        let mut missing = Vec::new();
        if settings.sender_email.trim().is_empty() {
            missing.push("sender_email");
        }

        let sender = Sender {
            email: settings.sender_email.clone(),
            name: settings.sender_name.clone(),
        };

        let channel = match method {
            DeliveryMethod::Smtp => {
                let host = required_text(settings.smtp_host.as_deref(), "smtp_host", &mut missing);
                let username =
                    required_text(settings.smtp_username.as_deref(), "smtp_username", &mut missing);
                let password =
                    required_text(settings.smtp_password.as_deref(), "smtp_password", &mut missing);
                let port = match settings.smtp_port {
                    Some(p) if (1..=i32::from(u16::MAX)).contains(&p) => p as u16,
                    _ => {
                        missing.push("smtp_port");
                        0
                    }
                };
                check_missing(method, &missing)?;
                Self::Smtp(SmtpChannel::new(host, port, username, password, sender))
            }
            DeliveryMethod::Mailgun => {
                let api_key = required_text(settings.api_key.as_deref(), "api_key", &mut missing);
                let domain =
                    required_text(settings.api_domain.as_deref(), "api_domain", &mut missing);
                check_missing(method, &missing)?;
                Self::Mailgun(MailgunChannel::new(
                    api_key,
                    domain,
                    settings.api_eu_region,
                    sender,
                )?)
            }
            DeliveryMethod::Relay => {
                check_missing(method, &missing)?;
                Self::Relay(RelayChannel::new(sender))
            }
            DeliveryMethod::GmailApi => {
                check_missing(method, &missing)?;
                Self::GmailApi(GmailApiChannel::new(sender))
            }
        };

        Ok(channel)
    }

    /// Stable channel name for logs and receipts.
    pub fn method(&self) -> &'static str {
        match self {
            Self::Smtp(_) => DeliveryMethod::Smtp.as_str(),
            Self::Mailgun(_) => DeliveryMethod::Mailgun.as_str(),
            Self::Relay(_) => DeliveryMethod::Relay.as_str(),
            Self::GmailApi(_) => DeliveryMethod::GmailApi.as_str(),
        }
    }

    /// Send one rendered notification through this channel.
    pub async fn send(
        &self,
        recipients: &[Recipient],
        subject: &str,
        html: &str,
    ) -> Result<DeliveryReceipt> {
        match self {
            Self::Smtp(channel) => channel.send(recipients, subject, html).await,
            Self::Mailgun(channel) => channel.send(recipients, subject, html).await,
            Self::Relay(channel) => channel.send(recipients, subject, html).await,
            Self::GmailApi(channel) => channel.send(recipients, subject, html).await,
        }
    }
}

fn required_text(value: Option<&str>, field: &'static str, missing: &mut Vec<&'static str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => {
            missing.push(field);
            String::new()
        }
    }
}

fn check_missing(method: DeliveryMethod, missing: &[&'static str]) -> Result<()> {
    if missing.is_empty() {
        return Ok(());
    }
    Err(NotifierError::config(format!(
        "delivery settings missing required fields for {}: {}",
        method.as_str(),
        missing.join(", ")
    )))
}

/// Build the HTML email with first-recipient-as-To, remainder-as-Bcc.
///
/// Only the first recipient appears in the headers; everyone else rides the
/// SMTP envelope, so no recipient ever sees the full audience list.
pub(crate) fn build_email(
    sender: &Sender,
    recipients: &[Recipient],
    subject: &str,
    html: &str,
    message_id: &str,
) -> Result<Message> {
    let (first, _) = recipients
        .split_first()
        .ok_or_else(|| NotifierError::validation("recipients", "recipient list is empty"))?;

    let from_mailbox = sender.mailbox()?;
    let envelope_to: Vec<Address> = recipients
        .iter()
        .map(|r| r.email.parse::<Address>())
        .collect::<std::result::Result<_, _>>()?;
    let envelope = Envelope::new(Some(from_mailbox.email.clone()), envelope_to)?;

    let message = Message::builder()
        .from(from_mailbox)
        .to(first.email.parse::<Mailbox>()?)
        .subject(subject)
        .message_id(Some(message_id.to_string()))
        .header(ContentType::TEXT_HTML)
        .envelope(envelope)
        .body(html.to_string())?;

    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings(method: &str) -> DeliverySettings {
        DeliverySettings {
            id: 1,
            method: method.to_string(),
            sender_email: "station@example.org".to_string(),
            sender_name: "The Station".to_string(),
            subject_template: "{{show_name}}".to_string(),
            body_template: "{{interviewees_list}}".to_string(),
            smtp_host: Some("smtp.example.org".to_string()),
            smtp_port: Some(587),
            smtp_username: Some("station".to_string()),
            smtp_password: Some("secret".to_string()),
            api_key: Some("key-123".to_string()),
            api_domain: Some("mg.example.org".to_string()),
            api_eu_region: false,
        }
    }

    fn recipients(emails: &[&str]) -> Vec<Recipient> {
        emails
            .iter()
            .enumerate()
            .map(|(i, e)| Recipient {
                id: i as i64 + 1,
                email: e.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_from_settings_selects_each_method() {
        for (method, expected) in [
            ("smtp", "smtp"),
            ("mailgun", "mailgun"),
            ("relay", "relay"),
            ("gmail_api", "gmail_api"),
        ] {
            let channel = DeliveryChannel::from_settings(&base_settings(method)).unwrap();
            assert_eq!(channel.method(), expected);
        }
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let err = DeliveryChannel::from_settings(&base_settings("sendgrid")).unwrap_err();
        assert!(err.to_string().contains("sendgrid"));
    }

    #[test]
    fn test_missing_smtp_fields_are_all_named() {
        let mut settings = base_settings("smtp");
        settings.smtp_host = None;
        settings.smtp_password = Some("  ".to_string());

        let err = DeliveryChannel::from_settings(&settings).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("smtp_host"));
        assert!(message.contains("smtp_password"));
        assert!(!message.contains("smtp_username"));
    }

    #[test]
    fn test_missing_mailgun_fields_are_named() {
        let mut settings = base_settings("mailgun");
        settings.api_key = None;

        let err = DeliveryChannel::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_out_of_range_smtp_port_is_missing() {
        let mut settings = base_settings("smtp");
        settings.smtp_port = Some(0);

        let err = DeliveryChannel::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("smtp_port"));
    }

    #[test]
    fn test_relay_needs_only_sender() {
        let mut settings = base_settings("relay");
        settings.smtp_host = None;
        settings.smtp_port = None;
        settings.smtp_username = None;
        settings.smtp_password = None;
        settings.api_key = None;
        settings.api_domain = None;

        assert!(DeliveryChannel::from_settings(&settings).is_ok());

        settings.sender_email = String::new();
        let err = DeliveryChannel::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("sender_email"));
    }

    #[test]
    fn test_build_email_uses_bcc_for_extra_recipients() {
        let sender = Sender {
            email: "station@example.org".to_string(),
            name: "The Station".to_string(),
        };
        let message = build_email(
            &sender,
            &recipients(&["a@example.org", "b@example.org", "c@example.org"]),
            "Tonight",
            "<p>lineup</p>",
            "<id-1@example.org>",
        )
        .unwrap();

        let rendered = String::from_utf8(message.formatted()).unwrap();
        assert!(rendered.contains("To: a@example.org"));
        // Secondary recipients ride the envelope only, never the headers.
        assert!(!rendered.contains("b@example.org"));
        let envelope: Vec<String> = message
            .envelope()
            .to()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert!(envelope.contains(&"b@example.org".to_string()));
        assert!(envelope.contains(&"c@example.org".to_string()));
    }

    #[test]
    fn test_build_email_rejects_empty_recipients() {
        let sender = Sender {
            email: "station@example.org".to_string(),
            name: String::new(),
        };
        let err = build_email(&sender, &[], "s", "b", "<id@x>").unwrap_err();
        assert!(err.to_string().contains("recipients"));
    }

    #[tokio::test]
    async fn test_gmail_api_send_fails_without_network() {
        let channel = DeliveryChannel::from_settings(&base_settings("gmail_api")).unwrap();
        let err = channel
            .send(&recipients(&["a@example.org"]), "subject", "<p>body</p>")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }
}
