//! # Lineup Notifier
//!
//! Background notification dispatcher for a radio-show lineup system:
//! - Scans today's scheduled shows and sends one email per show at air time
//! - Half-hour-aligned dispatch cycles with a ±5 minute eligibility window
//! - Postgres advisory locks so concurrent instances never double-send
//! - Token-based subject/body templates with an RTL interviewee list
//! - Pluggable delivery channels: SMTP, Mailgun, local relay
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lineup_notifier::{NotifierConfig, ShowNotifier};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NotifierConfig::from_env()?;
//!     let mut notifier = ShowNotifier::new(config).await?;
//!
//!     notifier.start();
//!     tokio::signal::ctrl_c().await?;
//!     notifier.stop().await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lock;
pub mod models;
pub mod scheduler;
pub mod store;
pub mod templates;

pub use config::{DatabaseConfig, DispatchConfig, NotifierConfig};
pub use dispatcher::{ChannelGateway, Dispatcher};
pub use error::{NotifierError, Result};
pub use lock::PgLockCoordinator;
pub use scheduler::DispatchScheduler;
pub use store::PgShowStore;

type PgDispatcher = Dispatcher<PgShowStore, PgLockCoordinator, ChannelGateway>;

/// Top-level service handle wiring the store, locks, channels and scheduler
pub struct ShowNotifier {
    dispatcher: Arc<PgDispatcher>,
    scheduler: DispatchScheduler,
    pool: PgPool,
}

impl ShowNotifier {
    /// Connect to the database, apply pending migrations and assemble the
    /// dispatch pipeline.
    pub async fn new(config: NotifierConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_pool_size)
            .min_connections(config.database.min_pool_size)
            .acquire_timeout(Duration::from_secs(config.database.connection_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.database.idle_timeout_seconds))
            .connect(&config.database.url)
            .await?;

        if config.database.run_migrations {
            info!("applying database migrations");
            sqlx::migrate!("./migrations").run(&pool).await?;
        }

        let dispatcher = Arc::new(Dispatcher::new(
            PgShowStore::new(pool.clone()),
            PgLockCoordinator::new(pool.clone()),
            ChannelGateway,
            config.dispatch,
        ));
        let runner: Arc<dyn scheduler::CycleRunner> = dispatcher.clone();
        let scheduler = DispatchScheduler::new(runner);

        Ok(Self {
            dispatcher,
            scheduler,
            pool,
        })
    }

    /// Start the background scheduler.
    pub fn start(&mut self) {
        self.scheduler.start();
    }

    /// Stop the background scheduler, waiting for any in-flight cycle.
    pub async fn stop(&mut self) -> Result<()> {
        self.scheduler.stop().await
    }

    /// Run a single dispatch cycle without the scheduler.
    pub async fn run_once(&self) {
        self.dispatcher.run_cycle().await;
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
