//! Database transaction utilities
//!
//! Multi-row writes (batch claims, primary swaps, ordered media inserts) run inside a single
//! transaction so a failure leaves no partial rows behind.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

/// Transaction wrapper with explicit commit.
///
/// Dropping the guard without calling [`TransactionGuard::commit`] rolls the transaction back.
///
/// # Example
///
/// ```ignore
/// use likeness_db::TransactionGuard;
///
/// async fn example(pool: &sqlx::PgPool) -> anyhow::Result<()> {
///     let mut tx = TransactionGuard::begin(pool).await?;
///     tx.lock_key("jane").await?;
///     sqlx::query("UPDATE identities SET ...").execute(tx.conn()).await?;
///     tx.commit().await
/// }
/// ```
pub struct TransactionGuard<'a> {
    transaction: Transaction<'a, Postgres>,
}

impl<'a> TransactionGuard<'a> {
    /// Begin a new database transaction
    pub async fn begin(pool: &'a PgPool) -> Result<Self> {
        let transaction = pool
            .begin()
            .await
            .context("Failed to begin database transaction")?;

        Ok(Self { transaction })
    }

    /// Connection bound to this transaction, usable as a sqlx executor.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.transaction
    }

    /// Takes a transaction-scoped advisory lock keyed by `key`.
    ///
    /// Concurrent transactions locking the same key serialize until the holder commits or
    /// rolls back.
    pub async fn lock_key(&mut self, key: &str) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut *self.transaction)
            .await
            .context("Failed to acquire advisory lock")?;
        Ok(())
    }

    /// Commit the transaction
    pub async fn commit(self) -> Result<()> {
        self.transaction
            .commit()
            .await
            .context("Failed to commit database transaction")
    }

    /// Roll the transaction back explicitly
    pub async fn rollback(self) -> Result<()> {
        self.transaction
            .rollback()
            .await
            .context("Failed to rollback database transaction")
    }
}
