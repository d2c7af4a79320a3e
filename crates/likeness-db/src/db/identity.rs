//! Identity repository
//!
//! Owns every write to `identities`. Batch creation goes through [`IdentityRepository::claim_batch`],
//! which serializes per username with an advisory lock so the in-flight check and the insert
//! cannot interleave with a concurrent request for the same profile.

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use likeness_core::models::{Identity, IdentitySource, NewIdentity};

use super::transaction::TransactionGuard;

/// What counts as a conflicting batch when claiming a username.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictRule {
    /// Any batch of any stage still running.
    AnyInFlight,
    /// A running batch of the given stage.
    InFlightSource(IdentitySource),
    /// Any identity still processing, or completed with an image.
    ActiveIdentity,
}

impl ConflictRule {
    fn predicate(&self) -> &'static str {
        match self {
            ConflictRule::AnyInFlight => "gen_st = 'gen'",
            ConflictRule::InFlightSource(_) => "gen_st = 'gen' AND src = $2",
            ConflictRule::ActiveIdentity => {
                "(status = 'processing' OR (status = 'completed' AND generated_image_url IS NOT NULL))"
            }
        }
    }
}

/// Result of an atomic batch claim.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// Rows inserted, in the order they were requested.
    Created(Vec<Identity>),
    /// A conflicting batch exists; nothing was written.
    Conflict,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Failed identities are kept as a record of the attempt.
    Retained,
}

const IDENTITY_COLUMNS: &str = "id, name, source_photos, generated_image_url, status, src, \
     gen_id, gen_st, instagram_username, is_primary, created_at, updated_at";

#[derive(Clone)]
pub struct IdentityRepository {
    pool: PgPool,
}

impl IdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts `records` in one transaction without a conflict check.
    #[tracing::instrument(skip(self, records), fields(db.table = "identities", db.operation = "insert", count = records.len()))]
    pub async fn create_batch(&self, records: &[NewIdentity]) -> Result<Vec<Identity>> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;
        let created = insert_rows(tx.conn(), records).await?;
        tx.commit().await?;
        Ok(created)
    }

    /// Checks `rule` and inserts `records` under a per-username advisory lock.
    #[tracing::instrument(skip(self, records), fields(db.table = "identities", db.operation = "claim", count = records.len()))]
    pub async fn claim_batch(
        &self,
        username: &str,
        rule: ConflictRule,
        records: &[NewIdentity],
    ) -> Result<ClaimOutcome> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;
        tx.lock_key(username).await?;

        if conflict_exists(tx.conn(), username, rule).await? {
            tx.rollback().await?;
            return Ok(ClaimOutcome::Conflict);
        }

        let created = insert_rows(tx.conn(), records).await?;
        tx.commit().await?;
        Ok(ClaimOutcome::Created(created))
    }

    /// Read-only form of the claim check. Does not lock.
    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "select"))]
    pub async fn has_in_flight_batch(&self, username: &str, rule: ConflictRule) -> Result<bool> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        conflict_exists(&mut *conn, username, rule).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "select", db.record_id = %id))]
    pub async fn get(&self, id: Uuid) -> Result<Option<Identity>> {
        let sql = format!("SELECT {} FROM identities WHERE id = $1", IDENTITY_COLUMNS);
        sqlx::query_as::<Postgres, Identity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get identity")
    }

    /// Lists identities newest first, optionally restricted to one username.
    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "select"))]
    pub async fn list(&self, username: Option<&str>) -> Result<Vec<Identity>> {
        let sql = format!(
            "SELECT {} FROM identities \
             WHERE ($1::text IS NULL OR instagram_username = $1) \
             ORDER BY created_at DESC, name ASC",
            IDENTITY_COLUMNS
        );
        sqlx::query_as::<Postgres, Identity>(&sql)
            .bind(username)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list identities")
    }

    /// Output URLs of completed seedream identities for a username.
    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "select"))]
    pub async fn seedream_urls(&self, username: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT generated_image_url
            FROM identities
            WHERE instagram_username = $1
              AND src = 'sd'
              AND generated_image_url IS NOT NULL
            ORDER BY created_at ASC
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch seedream images")?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    /// Sets the output URL and `completed`. Failed rows are never touched.
    ///
    /// Returns `false` when no row was updated.
    #[tracing::instrument(skip(self, url), fields(db.table = "identities", db.operation = "update", db.record_id = %id))]
    pub async fn mark_completed(&self, id: Uuid, url: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET generated_image_url = $2, status = 'completed', updated_at = NOW()
            WHERE id = $1 AND status <> 'failed'
            "#,
        )
        .bind(id)
        .bind(url)
        .execute(&self.pool)
        .await
        .context("Failed to mark identity completed")?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "update", db.record_id = %id))]
    pub async fn mark_failed(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET status = 'failed', updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark identity failed")?;
        Ok(result.rows_affected() > 0)
    }

    /// Flips every row of a batch to `gen_st = 'done'` in one statement.
    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "update", db.gen_id = %gen_id))]
    pub async fn finish_batch(&self, gen_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET gen_st = 'done'
            WHERE gen_id = $1 AND gen_st IS DISTINCT FROM 'done'
            "#,
        )
        .bind(gen_id)
        .execute(&self.pool)
        .await
        .context("Failed to finish generation batch")?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "delete", db.record_id = %id))]
    pub async fn delete(&self, id: Uuid) -> Result<DeleteOutcome> {
        let result = sqlx::query("DELETE FROM identities WHERE id = $1 AND status <> 'failed'")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete identity")?;

        if result.rows_affected() > 0 {
            return Ok(DeleteOutcome::Deleted);
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM identities WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check identity")?;

        Ok(if exists.is_some() {
            DeleteOutcome::Retained
        } else {
            DeleteOutcome::NotFound
        })
    }

    /// Makes `id` the only primary identity of `username`.
    ///
    /// Returns `false` (and changes nothing) when the identity does not belong to the username.
    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "update", db.record_id = %id))]
    pub async fn set_primary(&self, username: &str, id: Uuid) -> Result<bool> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        sqlx::query(
            r#"
            UPDATE identities
            SET is_primary = FALSE
            WHERE instagram_username = $1 AND is_primary
            "#,
        )
        .bind(username)
        .execute(tx.conn())
        .await
        .context("Failed to clear primary identity")?;

        let result = sqlx::query(
            r#"
            UPDATE identities
            SET is_primary = TRUE
            WHERE id = $1 AND instagram_username = $2
            "#,
        )
        .bind(id)
        .bind(username)
        .execute(tx.conn())
        .await
        .context("Failed to set primary identity")?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    #[tracing::instrument(skip(self), fields(db.table = "identities", db.operation = "select"))]
    pub async fn get_primary(&self, username: &str) -> Result<Option<Identity>> {
        let sql = format!(
            "SELECT {} FROM identities WHERE instagram_username = $1 AND is_primary LIMIT 1",
            IDENTITY_COLUMNS
        );
        sqlx::query_as::<Postgres, Identity>(&sql)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get primary identity")
    }
}

async fn conflict_exists(
    conn: &mut sqlx::PgConnection,
    username: &str,
    rule: ConflictRule,
) -> Result<bool> {
    let sql = format!(
        "SELECT EXISTS (SELECT 1 FROM identities WHERE instagram_username = $1 AND {})",
        rule.predicate()
    );
    let mut query = sqlx::query_scalar::<Postgres, bool>(&sql).bind(username);
    if let ConflictRule::InFlightSource(src) = rule {
        query = query.bind(src.as_str());
    }
    query
        .fetch_one(conn)
        .await
        .context("Failed to check for in-flight generation")
}

/// Inserts all rows with a single `INSERT ... SELECT FROM UNNEST`.
///
/// Ids are assigned here so the returned rows can be put back in request order.
async fn insert_rows(conn: &mut sqlx::PgConnection, records: &[NewIdentity]) -> Result<Vec<Identity>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<Uuid> = records.iter().map(|_| Uuid::new_v4()).collect();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    let photos: Vec<JsonValue> = records
        .iter()
        .map(|r| JsonValue::from(r.source_photos.clone()))
        .collect();
    let srcs: Vec<&str> = records.iter().map(|r| r.src.as_str()).collect();
    let gen_ids: Vec<Option<Uuid>> = records.iter().map(|r| r.gen_id).collect();
    let gen_sts: Vec<Option<String>> = records
        .iter()
        .map(|r| r.gen_st.map(|st| st.to_string()))
        .collect();
    let usernames: Vec<Option<&str>> = records
        .iter()
        .map(|r| r.instagram_username.as_deref())
        .collect();

    let sql = format!(
        r#"
        INSERT INTO identities (id, name, source_photos, status, src, gen_id, gen_st, instagram_username)
        SELECT t.id,
               t.name,
               ARRAY(SELECT jsonb_array_elements_text(t.photos)),
               'processing',
               t.src,
               t.gen_id,
               t.gen_st,
               t.username
        FROM UNNEST($1::uuid[], $2::text[], $3::jsonb[], $4::text[], $5::uuid[], $6::text[], $7::text[])
            AS t(id, name, photos, src, gen_id, gen_st, username)
        RETURNING {}
        "#,
        IDENTITY_COLUMNS
    );

    let mut rows = sqlx::query_as::<Postgres, Identity>(&sql)
        .bind(&ids)
        .bind(&names)
        .bind(&photos)
        .bind(&srcs)
        .bind(&gen_ids)
        .bind(&gen_sts)
        .bind(&usernames)
        .fetch_all(conn)
        .await
        .context("Failed to create identity records")?;

    rows.sort_by_key(|row| ids.iter().position(|id| *id == row.id));
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_predicates_match_stage_rules() {
        assert_eq!(ConflictRule::AnyInFlight.predicate(), "gen_st = 'gen'");
        assert!(ConflictRule::InFlightSource(IdentitySource::Var)
            .predicate()
            .contains("src = $2"));
        let active = ConflictRule::ActiveIdentity.predicate();
        assert!(active.contains("status = 'processing'"));
        assert!(active.contains("generated_image_url IS NOT NULL"));
    }
}
