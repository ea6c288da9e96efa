//! Proposal and reply-thread queries.
//!
//! State transitions are guarded in SQL (`WHERE status = ...`), so a
//! transition that lost a race reports `false` instead of overwriting.

use myproposal_core::db::unix_timestamp;

use super::db::{AppDatabase, DatabaseError};
use super::models::{Channel, Message, MessageAuthor, Proposal, ProposalStatus};

/// Parameters for [`AppDatabase::create_proposal`].
#[derive(Debug, Clone)]
pub struct NewProposal<'a> {
    pub id: &'a str,
    pub sender_id: &'a str,
    pub recipient_name: &'a str,
    pub recipient_email: Option<&'a str>,
    pub recipient_phone: Option<&'a str>,
    pub message: &'a str,
    pub tone: Option<&'a str>,
    pub provider: Option<&'a str>,
    pub expires_at: i64,
}

/// Editable fields of a draft; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProposalEdit<'a> {
    pub recipient_name: Option<&'a str>,
    pub recipient_email: Option<&'a str>,
    pub recipient_phone: Option<&'a str>,
    pub message: Option<&'a str>,
}

impl AppDatabase {
    pub async fn create_proposal(&self, p: &NewProposal<'_>) -> Result<Proposal, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO proposals (id, sender_id, recipient_name, recipient_email, recipient_phone, \
             message, tone, provider, status, expires_at, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'DRAFT', ?, ?, ?)",
        )
        .bind(p.id)
        .bind(p.sender_id)
        .bind(p.recipient_name)
        .bind(p.recipient_email)
        .bind(p.recipient_phone)
        .bind(p.message)
        .bind(p.tone)
        .bind(p.provider)
        .bind(p.expires_at)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_proposal(p.id).await
    }

    pub async fn get_proposal(&self, id: &str) -> Result<Proposal, DatabaseError> {
        sqlx::query_as::<_, Proposal>("SELECT * FROM proposals WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Proposal {id}")))
    }

    /// Get a proposal only if `sender_id` owns it.
    pub async fn get_proposal_for_sender(
        &self,
        id: &str,
        sender_id: &str,
    ) -> Result<Proposal, DatabaseError> {
        sqlx::query_as::<_, Proposal>("SELECT * FROM proposals WHERE id = ? AND sender_id = ?")
            .bind(id)
            .bind(sender_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Proposal {id}")))
    }

    pub async fn list_proposals_for_sender(
        &self,
        sender_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Proposal>, DatabaseError> {
        let proposals = sqlx::query_as::<_, Proposal>(
            "SELECT * FROM proposals WHERE sender_id = ? \
             ORDER BY created_at DESC, id LIMIT ? OFFSET ?",
        )
        .bind(sender_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(proposals)
    }

    /// Apply an edit to a draft. Returns `false` if the proposal is no longer
    /// a draft.
    pub async fn update_proposal_draft(
        &self,
        id: &str,
        edit: &ProposalEdit<'_>,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE proposals SET recipient_name = COALESCE(?, recipient_name), \
             recipient_email = COALESCE(?, recipient_email), \
             recipient_phone = COALESCE(?, recipient_phone), \
             message = COALESCE(?, message), updated_at = ? \
             WHERE id = ? AND status = 'DRAFT'",
        )
        .bind(edit.recipient_name)
        .bind(edit.recipient_email)
        .bind(edit.recipient_phone)
        .bind(edit.message)
        .bind(unix_timestamp())
        .bind(id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// `Draft | Sent -> Sent`, recording the channel and provider reference.
    pub async fn mark_proposal_sent(
        &self,
        id: &str,
        channel: Channel,
        delivery_ref: &str,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE proposals SET status = 'SENT', channel = ?, delivery_ref = ?, sent_at = ?, \
             updated_at = ? WHERE id = ? AND status IN ('DRAFT', 'SENT') AND expires_at > ?",
        )
        .bind(channel)
        .bind(delivery_ref)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// `Sent -> Accepted | Rejected`, only while unexpired.
    pub async fn record_proposal_response(
        &self,
        id: &str,
        answer: ProposalStatus,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        if !matches!(answer, ProposalStatus::Accepted | ProposalStatus::Rejected) {
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE proposals SET status = ?, responded_at = ?, updated_at = ? \
             WHERE id = ? AND status = 'SENT' AND expires_at > ?",
        )
        .bind(answer)
        .bind(now)
        .bind(now)
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Expire every open proposal whose deadline has passed.
    pub async fn expire_overdue_proposals(&self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE proposals SET status = 'EXPIRED', updated_at = ? \
             WHERE status IN ('DRAFT', 'SENT') AND expires_at <= ?",
        )
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    /// Expire a single proposal if it is open and overdue.
    pub async fn expire_proposal_if_overdue(&self, id: &str, now: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE proposals SET status = 'EXPIRED', updated_at = ? \
             WHERE id = ? AND status IN ('DRAFT', 'SENT') AND expires_at <= ?",
        )
        .bind(now)
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Reply thread
    // =========================================================================

    pub async fn add_message(
        &self,
        id: &str,
        proposal_id: &str,
        author: MessageAuthor,
        body: &str,
    ) -> Result<Message, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO messages (id, proposal_id, author, body, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(proposal_id)
        .bind(author)
        .bind(body)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(Message {
            id: id.to_string(),
            proposal_id: proposal_id.to_string(),
            author,
            body: body.to_string(),
            created_at: now,
        })
    }

    /// Thread messages, oldest first.
    pub async fn list_messages(&self, proposal_id: &str) -> Result<Vec<Message>, DatabaseError> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT * FROM messages WHERE proposal_id = ? ORDER BY created_at, rowid",
        )
        .bind(proposal_id)
        .fetch_all(self.pool())
        .await?;

        Ok(messages)
    }
}
