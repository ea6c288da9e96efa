//! Transactions, audit log, and webhook replay bookkeeping.

use myproposal_core::db::unix_timestamp;

use super::db::{AppDatabase, DatabaseError};
use super::models::{AuditLog, Transaction, TransactionKind};

/// Parameters for [`AppDatabase::record_transaction`].
#[derive(Debug, Clone)]
pub struct NewTransaction<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub kind: TransactionKind,
    pub amount_cents: i64,
    pub currency: &'a str,
    pub stripe_ref: Option<&'a str>,
}

impl AppDatabase {
    // =========================================================================
    // Transactions
    // =========================================================================

    pub async fn record_transaction(
        &self,
        tx: &NewTransaction<'_>,
    ) -> Result<Transaction, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO transactions (id, user_id, kind, amount_cents, currency, stripe_ref, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(tx.id)
        .bind(tx.user_id)
        .bind(tx.kind)
        .bind(tx.amount_cents)
        .bind(tx.currency)
        .bind(tx.stripe_ref)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(Transaction {
            id: tx.id.to_string(),
            user_id: tx.user_id.to_string(),
            kind: tx.kind,
            amount_cents: tx.amount_cents,
            currency: tx.currency.to_string(),
            stripe_ref: tx.stripe_ref.map(String::from),
            created_at: now,
        })
    }

    /// List transactions, newest first, optionally for one user.
    pub async fn list_transactions(
        &self,
        user_id: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Transaction>, DatabaseError> {
        let rows = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE (? IS NULL OR user_id = ?) \
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(user_id)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Audit log
    // =========================================================================

    pub async fn record_audit(
        &self,
        id: &str,
        actor_id: &str,
        action: &str,
        target_id: Option<&str>,
        detail: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO audit_logs (id, actor_id, action, target_id, detail, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(actor_id)
        .bind(action)
        .bind(target_id)
        .bind(detail.to_string())
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(())
    }

    pub async fn list_audit_logs(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<AuditLog>, DatabaseError> {
        let rows = sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_logs ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    // =========================================================================
    // Webhook replay protection
    // =========================================================================

    /// Claim a webhook event id. Returns `false` if it was already claimed.
    pub async fn mark_webhook_event_processed(
        &self,
        event_id: &str,
        event_type: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO processed_webhook_events (event_id, event_type, received_at) \
             VALUES (?, ?, ?)",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Release a claim so a failed event can be retried by the sender.
    pub async fn unmark_webhook_event(&self, event_id: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM processed_webhook_events WHERE event_id = ?")
            .bind(event_id)
            .execute(self.pool())
            .await?;

        Ok(())
    }
}
