//! Data model for the show notification dispatcher
//!
//! These types mirror the schedule store's relations. Everything except
//! [`NotificationOutcome`] is read-only from the dispatcher's perspective;
//! the outcome log is the single relation this service writes.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::{NotifierError, Result};

/// A scheduled broadcast event, owned by the external schedule store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Show {
    pub id: i64,
    pub name: String,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub notes: Option<String>,
}

impl Show {
    /// Scheduled start expressed as minute-of-day, if the show has a time.
    pub fn minute_of_day(&self) -> Option<i64> {
        use chrono::Timelike;
        self.time
            .map(|t| i64::from(t.hour()) * 60 + i64::from(t.minute()))
    }
}

/// An ordered content entry belonging to a show.
///
/// Regular items name an interviewee directly; break/note/divider items are
/// structural and contribute to the notification only through attached
/// [`Interviewee`] records.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShowItem {
    pub id: i64,
    pub show_id: i64,
    pub position: i32,
    pub name: String,
    pub title: Option<String>,
    pub is_break: bool,
    pub is_note: bool,
    pub is_divider: bool,
    #[sqlx(skip)]
    pub interviewees: Vec<Interviewee>,
}

impl ShowItem {
    /// True for break/note/divider rows, which carry no interviewee of
    /// their own.
    pub fn is_structural(&self) -> bool {
        self.is_break || self.is_note || self.is_divider
    }
}

/// An interviewee attached to a show item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Interviewee {
    pub id: i64,
    pub item_id: i64,
    pub name: String,
    pub title: Option<String>,
}

/// The single delivery configuration record, edited by an administrator and
/// re-read every cycle so changes apply without a restart.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliverySettings {
    pub id: i64,
    pub method: String,
    pub sender_email: String,
    pub sender_name: String,
    pub subject_template: String,
    pub body_template: String,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub api_key: Option<String>,
    pub api_domain: Option<String>,
    pub api_eu_region: bool,
}

/// A notification recipient. The full recipient set is the audience for
/// every show; there are no per-show lists.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipient {
    pub id: i64,
    pub email: String,
}

/// One logical outcome row per show, upserted on every send attempt.
///
/// A row with `success = true` is the terminal "already handled" signal;
/// a failed row is expected to be superseded by a later successful attempt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NotificationOutcome {
    pub show_id: i64,
    pub success: bool,
    pub error_message: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// The delivery channel selected by [`DeliverySettings::method`].
///
/// An unrecognized method is a configuration error, never a default
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMethod {
    Smtp,
    Mailgun,
    Relay,
    GmailApi,
}

impl DeliveryMethod {
    /// Parse the settings `method` column.
    pub fn parse(method: &str) -> Result<Self> {
        match method {
            "smtp" => Ok(Self::Smtp),
            "mailgun" => Ok(Self::Mailgun),
            "relay" => Ok(Self::Relay),
            "gmail_api" => Ok(Self::GmailApi),
            other => Err(NotifierError::config(format!(
                "unrecognized delivery method '{}'",
                other
            ))),
        }
    }

    /// Stable channel name used in logs and delivery receipts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Smtp => "smtp",
            Self::Mailgun => "mailgun",
            Self::Relay => "relay",
            Self::GmailApi => "gmail_api",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minute_of_day() {
        let show = Show {
            id: 1,
            name: "Morning Show".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(14, 30, 0),
            notes: None,
        };
        assert_eq!(show.minute_of_day(), Some(14 * 60 + 30));

        let untimed = Show { time: None, ..show };
        assert_eq!(untimed.minute_of_day(), None);
    }

    #[test]
    fn test_delivery_method_parse() {
        assert_eq!(DeliveryMethod::parse("smtp").unwrap(), DeliveryMethod::Smtp);
        assert_eq!(
            DeliveryMethod::parse("mailgun").unwrap(),
            DeliveryMethod::Mailgun
        );
        assert_eq!(
            DeliveryMethod::parse("relay").unwrap(),
            DeliveryMethod::Relay
        );
        assert_eq!(
            DeliveryMethod::parse("gmail_api").unwrap(),
            DeliveryMethod::GmailApi
        );
    }

    #[test]
    fn test_unknown_method_is_an_error_not_a_fallback() {
        let err = DeliveryMethod::parse("carrier_pigeon").unwrap_err();
        assert!(err.to_string().contains("carrier_pigeon"));
    }

    #[test]
    fn test_structural_items() {
        let item = ShowItem {
            id: 1,
            show_id: 1,
            position: 0,
            name: "News break".to_string(),
            title: None,
            is_break: true,
            is_note: false,
            is_divider: false,
            interviewees: vec![],
        };
        assert!(item.is_structural());
    }
}
