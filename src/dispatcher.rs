//! Dispatch cycle orchestration
//!
//! One cycle scans today's shows, filters them to the ±5 minute eligibility
//! window around "now", and runs the locked send sequence per candidate:
//! acquire the distributed lock, re-check both duplicate conditions, render,
//! deliver, record the outcome, release the lock. A process-wide atomic flag
//! drops ticks that fire while a previous cycle is still running, and no
//! candidate's failure is allowed to abort the rest of the cycle.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, Timelike, Utc};
use tracing::{debug, error, info, warn};

use crate::channels::{DeliveryChannel, DeliveryReceipt};
use crate::config::DispatchConfig;
use crate::error::{NotifierError, Result};
use crate::lock::LockCoordinator;
use crate::models::{Recipient, Show};
use crate::scheduler::CycleRunner;
use crate::store::ShowStore;
use crate::templates;

/// Date format used for the `{{show_date}}` token.
const DATE_FORMAT: &str = "%d/%m/%Y";

/// Seam between the dispatcher and the concrete delivery channels
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    async fn deliver(
        &self,
        channel: &DeliveryChannel,
        recipients: &[Recipient],
        subject: &str,
        html: &str,
    ) -> Result<DeliveryReceipt>;
}

/// Production gateway: hand the rendered message to the selected channel
#[derive(Debug, Clone, Default)]
pub struct ChannelGateway;

#[async_trait]
impl DeliveryGateway for ChannelGateway {
    async fn deliver(
        &self,
        channel: &DeliveryChannel,
        recipients: &[Recipient],
        subject: &str,
        html: &str,
    ) -> Result<DeliveryReceipt> {
        channel.send(recipients, subject, html).await
    }
}

/// The dispatch cycle orchestrator
pub struct Dispatcher<S, L, G> {
    store: S,
    locks: L,
    gateway: G,
    config: DispatchConfig,
    in_flight: AtomicBool,
}

/// Clears the single-flight flag on every exit path of a cycle.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<S, L, G> Dispatcher<S, L, G>
where
    S: ShowStore,
    L: LockCoordinator,
    G: DeliveryGateway,
{
    pub fn new(store: S, locks: L, gateway: G, config: DispatchConfig) -> Self {
        Self {
            store,
            locks,
            gateway,
            config,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one dispatch cycle against the current local wall clock.
    pub async fn run_cycle(&self) {
        self.run_cycle_at(Local::now()).await;
    }

    /// Cycle body, parameterized on "now" so the timing rules are testable.
    async fn run_cycle_at(&self, now: DateTime<Local>) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("previous dispatch cycle still running, skipping this tick");
            return;
        }
        let _guard = CycleGuard(&self.in_flight);

        let today = now.date_naive();
        let minute_of_day = i64::from(now.hour()) * 60 + i64::from(now.minute());

        let shows = match self.store.due_shows(today).await {
            Ok(shows) => shows,
            Err(e) => {
                error!(error = %e, "candidate scan failed");
                return;
            }
        };

        debug!(date = %today, candidates = shows.len(), "dispatch cycle started");

        for show in shows {
            // Scanner already filters untimed shows; skip defensively anyway.
            let Some(show_minute) = show.minute_of_day() else {
                continue;
            };

            let time_diff = (minute_of_day - show_minute).abs();
            if time_diff > self.config.eligibility_window_minutes {
                debug!(
                    show_id = show.id,
                    time_diff, "show outside eligibility window, deferring"
                );
                continue;
            }

            // One candidate's crash must not stop the rest of the cycle.
            if let Err(e) = self.dispatch_candidate(&show).await {
                error!(show_id = show.id, error = %e, "candidate dispatch failed unexpectedly");
            }
        }
    }

    /// The locked send sequence for one time-eligible candidate.
    ///
    /// Lock release is unconditional: the locked section returns a `Result`
    /// instead of propagating, so every exit path reaches the release.
    async fn dispatch_candidate(&self, show: &Show) -> Result<()> {
        let token = match self.locks.try_acquire(show.id).await? {
            Some(token) => token,
            None => {
                info!(
                    show_id = show.id,
                    "another dispatcher instance holds the lock, skipping"
                );
                return Ok(());
            }
        };

        let outcome = self.send_if_still_needed(show).await;

        if let Err(e) = self.locks.release(token).await {
            warn!(show_id = show.id, error = %e, "failed to release dispatch lock");
        }

        outcome
    }

    /// Duplicate re-checks inside the lock, then send-and-log.
    async fn send_if_still_needed(&self, show: &Show) -> Result<()> {
        // A send may have completed between the scan and taking the lock.
        if self.store.has_success(show.id).await? {
            info!(show_id = show.id, "notification already sent, skipping");
            return Ok(());
        }

        // Second net against clock skew and near-simultaneous ticks.
        let since = Utc::now() - Duration::minutes(self.config.duplicate_window_minutes);
        if self.store.has_recent_success(show.id, since).await? {
            info!(
                show_id = show.id,
                "success recorded within the duplicate window, skipping"
            );
            return Ok(());
        }

        self.send_and_log(show.id).await
    }

    /// Attempt the full notification and upsert exactly one outcome row.
    ///
    /// Validation, rendering and delivery failures become a failed outcome;
    /// they never propagate past the candidate boundary.
    async fn send_and_log(&self, show_id: i64) -> Result<()> {
        match self.attempt_send(show_id).await {
            Ok(receipt) => {
                info!(
                    show_id,
                    method = receipt.method,
                    message_id = receipt.message_id.as_deref().unwrap_or("-"),
                    "notification delivered"
                );
                self.store.record_outcome(show_id, true, None).await
            }
            Err(e) => {
                warn!(show_id, error = %e, "notification attempt failed");
                self.store
                    .record_outcome(show_id, false, Some(e.to_string()))
                    .await
            }
        }
    }

    /// Load, validate, render and deliver one notification.
    async fn attempt_send(&self, show_id: i64) -> Result<DeliveryReceipt> {
        let show = self
            .store
            .show(show_id)
            .await?
            .ok_or_else(|| NotifierError::not_found(format!("show {}", show_id)))?;

        let settings = self
            .store
            .delivery_settings()
            .await?
            .ok_or_else(|| NotifierError::config("no delivery settings record exists"))?;

        // Fails fast, naming missing fields, before any channel activity.
        let channel = DeliveryChannel::from_settings(&settings)?;

        let recipients = self.store.recipients().await?;
        if recipients.is_empty() {
            return Err(NotifierError::validation(
                "recipients",
                "recipient list is empty",
            ));
        }

        let items = self.store.show_items(show_id).await?;
        if items.is_empty() {
            return Err(NotifierError::validation("items", "show has no lineup items"));
        }

        let formatted_date = show.date.format(DATE_FORMAT).to_string();
        let link = templates::lineup_link(&self.config.lineup_base_url, show.id);
        let subject = templates::render(
            &settings.subject_template,
            &show,
            &items,
            &formatted_date,
            &link,
        );
        let html = templates::render(
            &settings.body_template,
            &show,
            &items,
            &formatted_date,
            &link,
        );

        self.gateway
            .deliver(&channel, &recipients, &subject, &html)
            .await
    }
}

#[async_trait]
impl<S, L, G> CycleRunner for Dispatcher<S, L, G>
where
    S: ShowStore,
    L: LockCoordinator,
    G: DeliveryGateway,
{
    async fn run_cycle(&self) {
        Dispatcher::run_cycle(self).await;
    }
}
