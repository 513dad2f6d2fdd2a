//! Distributed lock coordination for per-show dispatch
//!
//! Multiple dispatcher instances may run against the same database (deploys,
//! scaled workers). Before any send attempt the dispatcher takes a Postgres
//! advisory lock named deterministically from the show id; acquisition is
//! non-blocking, so a contending instance skips the show instead of waiting.
//!
//! Advisory locks are session-scoped: the token pins a dedicated pool
//! connection so the unlock runs on the same session that locked, and a
//! crashed process releases its locks implicitly when the connection drops.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::{Connection, PgPool, Postgres};
use tracing::warn;

use crate::error::Result;

/// Namespace constant mixed into every lock key so dispatcher locks cannot
/// collide with other advisory-lock users of the same database.
const LOCK_NAMESPACE: i64 = 0x6c69_6e65_7570_3a31;

/// Derive the advisory lock key for one show.
///
/// XOR with the namespace keeps the mapping injective over show ids.
pub fn lock_key(show_id: i64) -> i64 {
    LOCK_NAMESPACE ^ show_id
}

/// A held advisory lock for one show.
///
/// The token owns the database session the lock was granted on. It must be
/// passed back to [`LockCoordinator::release`] on every exit path of the
/// locked section; a leaked token still unlocks when its session closes.
pub struct LockToken {
    key: i64,
    conn: Option<PoolConnection<Postgres>>,
}

impl LockToken {
    /// The advisory lock key this token holds.
    pub fn key(&self) -> i64 {
        self.key
    }

    /// Token without a backing session, for exercising the dispatcher
    /// against mock coordinators.
    #[cfg(test)]
    pub(crate) fn detached(key: i64) -> Self {
        Self { key, conn: None }
    }
}

impl std::fmt::Debug for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockToken").field("key", &self.key).finish()
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        // A token that never went through release must not hand its session
        // back to the pool: a reused session would keep the advisory lock
        // held and block the show forever. Detaching closes the socket
        // instead, and the server drops the lock with the session.
        if let Some(conn) = self.conn.take() {
            warn!(
                key = self.key,
                "lock token dropped without release, closing its session"
            );
            drop(conn.detach());
        }
    }
}

/// Trait for acquiring and releasing per-show mutual exclusion
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LockCoordinator: Send + Sync {
    /// Try to acquire the lock for one show without blocking.
    ///
    /// Returns `None` when another instance already holds it.
    async fn try_acquire(&self, show_id: i64) -> Result<Option<LockToken>>;

    /// Release a previously acquired lock.
    async fn release(&self, token: LockToken) -> Result<()>;
}

/// Postgres advisory lock implementation of [`LockCoordinator`]
#[derive(Clone)]
pub struct PgLockCoordinator {
    pool: PgPool,
}

impl PgLockCoordinator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockCoordinator for PgLockCoordinator {
    async fn try_acquire(&self, show_id: i64) -> Result<Option<LockToken>> {
        let key = lock_key(show_id);
        let mut conn = self.pool.acquire().await?;

        let granted: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(key)
            .fetch_one(&mut *conn)
            .await?;

        if granted {
            Ok(Some(LockToken {
                key,
                conn: Some(conn),
            }))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, mut token: LockToken) -> Result<()> {
        let Some(mut conn) = token.conn.take() else {
            return Ok(());
        };

        let unlock = sqlx::query_scalar::<_, bool>("SELECT pg_advisory_unlock($1)")
            .bind(token.key)
            .fetch_one(&mut *conn)
            .await;

        match unlock {
            Ok(released) => {
                if !released {
                    warn!(key = token.key, "advisory unlock reported no lock held");
                }
                Ok(())
            }
            Err(e) => {
                // The session may still hold the lock; returning it to the
                // pool would let a reused connection carry the lock forever.
                // Close it instead so the server releases with the session.
                let _ = conn.detach().close().await;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key_is_deterministic() {
        assert_eq!(lock_key(42), lock_key(42));
    }

    #[test]
    fn test_lock_key_is_namespaced_and_injective() {
        assert_ne!(lock_key(1), 1);
        assert_ne!(lock_key(1), lock_key(2));

        // XOR against a constant never maps two ids to the same key.
        for a in 0..100i64 {
            for b in (a + 1)..100i64 {
                assert_ne!(lock_key(a), lock_key(b));
            }
        }
    }

    #[test]
    fn test_detached_token_carries_key() {
        let token = LockToken::detached(lock_key(7));
        assert_eq!(token.key(), lock_key(7));
    }

    #[test]
    fn test_dropping_token_without_session_is_harmless() {
        let token = LockToken::detached(lock_key(9));
        drop(token);
    }

    #[tokio::test]
    async fn test_release_without_session_is_a_noop() {
        let pool = PgPool::connect_lazy("postgresql://localhost/unused").unwrap();
        let coordinator = PgLockCoordinator::new(pool);

        let token = LockToken::detached(lock_key(11));
        assert!(coordinator.release(token).await.is_ok());
    }
}
