//! Transaction wrapper with hold-time diagnostics
//!
//! Logs how long a pooled connection waited to be acquired and how long the
//! transaction held it, so slow imports show up in the logs.

use bamort_common::{Error, Result};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;

/// Transaction that logs acquisition and release timing
pub struct MonitoredTransaction<'c> {
    tx: Option<Transaction<'c, Sqlite>>,
    caller: &'static str,
    acquired_at: Instant,
}

impl<'c> MonitoredTransaction<'c> {
    fn new(tx: Transaction<'c, Sqlite>, caller: &'static str) -> Self {
        Self {
            tx: Some(tx),
            caller,
            acquired_at: Instant::now(),
        }
    }

    /// Connection of the open transaction
    pub fn conn(&mut self) -> Result<&mut SqliteConnection> {
        self.tx
            .as_mut()
            .map(|tx| &mut **tx)
            .ok_or_else(|| Error::Internal(format!("{}: transaction already finished", self.caller)))
    }

    /// Commit and log how long the connection was held
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.take()?;
        tx.commit().await?;

        let held_ms = self.acquired_at.elapsed().as_millis();
        if held_ms > 2000 {
            tracing::warn!(caller = self.caller, held_ms, "Long transaction committed");
        } else if held_ms > 1000 {
            tracing::info!(caller = self.caller, held_ms, "Transaction held longer than expected (>1s)");
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Connection released (commit)");
        }

        Ok(())
    }

    fn take(&mut self) -> Result<Transaction<'c, Sqlite>> {
        self.tx
            .take()
            .ok_or_else(|| Error::Internal(format!("{}: transaction already finished", self.caller)))
    }
}

impl Drop for MonitoredTransaction<'_> {
    fn drop(&mut self) {
        // Dropping an open sqlx transaction rolls it back
        if self.tx.is_some() {
            let held_ms = self.acquired_at.elapsed().as_millis();
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "Transaction dropped without commit, rolling back"
            );
        }
    }
}

/// Begin a transaction with pool timing logs
///
/// ```ignore
/// let mut tx = begin_monitored(&pool, "orchestrator::import").await?;
/// sqlx::query("...").execute(tx.conn()?).await?;
/// tx.commit().await?;
/// ```
pub async fn begin_monitored<'c>(
    pool: &'c SqlitePool,
    caller: &'static str,
) -> Result<MonitoredTransaction<'c>> {
    let start = Instant::now();
    let tx = pool.begin().await?;

    let wait_ms = start.elapsed().as_millis();
    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "Slow connection acquisition, pool may be saturated");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction::new(tx, caller))
}
