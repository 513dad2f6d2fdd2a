//! Data access for the show notification dispatcher
//!
//! The schedule store (shows, items, interviewees, delivery settings,
//! recipients) is owned by the surrounding admin application and is strictly
//! read-only here. The only relation this service writes is
//! `show_notification_log`, one upserted row per attempted show.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::error::Result;
use crate::models::{DeliverySettings, Interviewee, Recipient, Show, ShowItem};

/// Trait over the dispatcher's database operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ShowStore: Send + Sync {
    /// All shows on the given date that have a scheduled time, have at least
    /// one item, and have no successful notification recorded yet.
    async fn due_shows(&self, date: NaiveDate) -> Result<Vec<Show>>;

    /// Load a single show by id.
    async fn show(&self, show_id: i64) -> Result<Option<Show>>;

    /// Load a show's items in running order, with interviewees attached.
    async fn show_items(&self, show_id: i64) -> Result<Vec<ShowItem>>;

    /// Load the single delivery settings record.
    async fn delivery_settings(&self) -> Result<Option<DeliverySettings>>;

    /// Load the full recipient list.
    async fn recipients(&self) -> Result<Vec<Recipient>>;

    /// Whether a successful notification is already recorded for the show.
    async fn has_success(&self, show_id: i64) -> Result<bool>;

    /// Whether a successful notification was recorded at or after `since`.
    async fn has_recent_success(&self, show_id: i64, since: DateTime<Utc>) -> Result<bool>;

    /// Upsert the outcome row for one show, keyed on `show_id`.
    async fn record_outcome(
        &self,
        show_id: i64,
        success: bool,
        error_message: Option<String>,
    ) -> Result<()>;
}

/// Postgres implementation of [`ShowStore`]
#[derive(Clone)]
pub struct PgShowStore {
    pool: PgPool,
}

impl PgShowStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShowStore for PgShowStore {
    async fn due_shows(&self, date: NaiveDate) -> Result<Vec<Show>> {
        let shows = sqlx::query_as::<_, Show>(
            r#"
            SELECT s.id, s.name, s.date, s.time, s.notes
            FROM shows s
            WHERE s.date = $1
              AND s.time IS NOT NULL
              AND EXISTS (
                  SELECT 1 FROM show_items i WHERE i.show_id = s.id
              )
              AND NOT EXISTS (
                  SELECT 1 FROM show_notification_log l
                  WHERE l.show_id = s.id AND l.success
              )
            "#,
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(shows)
    }

    async fn show(&self, show_id: i64) -> Result<Option<Show>> {
        let show = sqlx::query_as::<_, Show>(
            "SELECT id, name, date, time, notes FROM shows WHERE id = $1",
        )
        .bind(show_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(show)
    }

    async fn show_items(&self, show_id: i64) -> Result<Vec<ShowItem>> {
        let mut items = sqlx::query_as::<_, ShowItem>(
            r#"
            SELECT id, show_id, position, name, title, is_break, is_note, is_divider
            FROM show_items
            WHERE show_id = $1
            ORDER BY position
            "#,
        )
        .bind(show_id)
        .fetch_all(&self.pool)
        .await?;

        if items.is_empty() {
            return Ok(items);
        }

        let item_ids: Vec<i64> = items.iter().map(|i| i.id).collect();
        let interviewees = sqlx::query_as::<_, Interviewee>(
            r#"
            SELECT id, item_id, name, title
            FROM interviewees
            WHERE item_id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&item_ids)
        .fetch_all(&self.pool)
        .await?;

        for interviewee in interviewees {
            if let Some(item) = items.iter_mut().find(|i| i.id == interviewee.item_id) {
                item.interviewees.push(interviewee);
            }
        }

        Ok(items)
    }

    async fn delivery_settings(&self) -> Result<Option<DeliverySettings>> {
        let settings = sqlx::query_as::<_, DeliverySettings>(
            r#"
            SELECT id, method, sender_email, sender_name,
                   subject_template, body_template,
                   smtp_host, smtp_port, smtp_username, smtp_password,
                   api_key, api_domain, api_eu_region
            FROM delivery_settings
            ORDER BY id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings)
    }

    async fn recipients(&self) -> Result<Vec<Recipient>> {
        let recipients =
            sqlx::query_as::<_, Recipient>("SELECT id, email FROM recipients ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(recipients)
    }

    async fn has_success(&self, show_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM show_notification_log
                WHERE show_id = $1 AND success
            )
            "#,
        )
        .bind(show_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn has_recent_success(&self, show_id: i64, since: DateTime<Utc>) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM show_notification_log
                WHERE show_id = $1 AND success AND sent_at >= $2
            )
            "#,
        )
        .bind(show_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn record_outcome(
        &self,
        show_id: i64,
        success: bool,
        error_message: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO show_notification_log (show_id, success, error_message, sent_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (show_id) DO UPDATE
            SET success = EXCLUDED.success,
                error_message = EXCLUDED.error_message,
                sent_at = EXCLUDED.sent_at
            "#,
        )
        .bind(show_id)
        .bind(success)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
