//! Store trait abstractions
//!
//! Services depend on these traits instead of the concrete repositories so the pipeline can
//! be exercised with in-memory stores in tests.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use likeness_core::models::{ApiUsageLog, Identity, MediaItem, NewIdentity, NewMediaItem};

use crate::db::identity::{ClaimOutcome, ConflictRule, DeleteOutcome, IdentityRepository};
use crate::db::media_item::MediaItemRepository;
use crate::db::usage_log::UsageLogRepository;

/// Identity record store operations used by the generation pipeline and handlers
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Insert rows in one transaction with no conflict check.
    async fn create_batch(&self, records: Vec<NewIdentity>) -> Result<Vec<Identity>>;

    /// Atomically check `rule` for `username` and insert `records` if it passes.
    async fn claim_batch(
        &self,
        username: &str,
        rule: ConflictRule,
        records: Vec<NewIdentity>,
    ) -> Result<ClaimOutcome>;

    /// Whether a conflicting batch exists right now. Read-only.
    async fn has_in_flight_batch(&self, username: &str, rule: ConflictRule) -> Result<bool>;

    async fn get(&self, id: Uuid) -> Result<Option<Identity>>;

    /// Newest first; all usernames when `username` is `None`.
    async fn list(&self, username: Option<&str>) -> Result<Vec<Identity>>;

    async fn seedream_urls(&self, username: &str) -> Result<Vec<String>>;

    async fn mark_completed(&self, id: Uuid, url: &str) -> Result<bool>;

    async fn mark_failed(&self, id: Uuid) -> Result<bool>;

    async fn finish_batch(&self, gen_id: Uuid) -> Result<u64>;

    async fn delete(&self, id: Uuid) -> Result<DeleteOutcome>;

    async fn set_primary(&self, username: &str, id: Uuid) -> Result<bool>;

    async fn get_primary(&self, username: &str) -> Result<Option<Identity>>;
}

/// Media library operations
#[async_trait]
pub trait MediaItemStore: Send + Sync {
    async fn list(&self) -> Result<Vec<MediaItem>>;

    async fn get(&self, id: Uuid) -> Result<Option<MediaItem>>;

    async fn find_video_by_url(&self, url: &str) -> Result<Option<Uuid>>;

    /// Insert after the current highest display order, preserving slice order.
    async fn append(&self, items: Vec<NewMediaItem>) -> Result<Vec<MediaItem>>;

    async fn delete(&self, id: Uuid) -> Result<bool>;

    async fn delete_all(&self) -> Result<u64>;
}

/// Sink for billable third-party calls
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn record(&self, log: ApiUsageLog) -> Result<()>;
}

// Implementations for concrete repository types

#[async_trait]
impl IdentityStore for IdentityRepository {
    async fn create_batch(&self, records: Vec<NewIdentity>) -> Result<Vec<Identity>> {
        IdentityRepository::create_batch(self, &records).await
    }

    async fn claim_batch(
        &self,
        username: &str,
        rule: ConflictRule,
        records: Vec<NewIdentity>,
    ) -> Result<ClaimOutcome> {
        IdentityRepository::claim_batch(self, username, rule, &records).await
    }

    async fn has_in_flight_batch(&self, username: &str, rule: ConflictRule) -> Result<bool> {
        IdentityRepository::has_in_flight_batch(self, username, rule).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Identity>> {
        IdentityRepository::get(self, id).await
    }

    async fn list(&self, username: Option<&str>) -> Result<Vec<Identity>> {
        IdentityRepository::list(self, username).await
    }

    async fn seedream_urls(&self, username: &str) -> Result<Vec<String>> {
        IdentityRepository::seedream_urls(self, username).await
    }

    async fn mark_completed(&self, id: Uuid, url: &str) -> Result<bool> {
        IdentityRepository::mark_completed(self, id, url).await
    }

    async fn mark_failed(&self, id: Uuid) -> Result<bool> {
        IdentityRepository::mark_failed(self, id).await
    }

    async fn finish_batch(&self, gen_id: Uuid) -> Result<u64> {
        IdentityRepository::finish_batch(self, gen_id).await
    }

    async fn delete(&self, id: Uuid) -> Result<DeleteOutcome> {
        IdentityRepository::delete(self, id).await
    }

    async fn set_primary(&self, username: &str, id: Uuid) -> Result<bool> {
        IdentityRepository::set_primary(self, username, id).await
    }

    async fn get_primary(&self, username: &str) -> Result<Option<Identity>> {
        IdentityRepository::get_primary(self, username).await
    }
}

#[async_trait]
impl MediaItemStore for MediaItemRepository {
    async fn list(&self) -> Result<Vec<MediaItem>> {
        MediaItemRepository::list(self).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaItem>> {
        MediaItemRepository::get(self, id).await
    }

    async fn find_video_by_url(&self, url: &str) -> Result<Option<Uuid>> {
        MediaItemRepository::find_video_by_url(self, url).await
    }

    async fn append(&self, items: Vec<NewMediaItem>) -> Result<Vec<MediaItem>> {
        MediaItemRepository::append(self, &items).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        MediaItemRepository::delete(self, id).await
    }

    async fn delete_all(&self) -> Result<u64> {
        MediaItemRepository::delete_all(self).await
    }
}

#[async_trait]
impl UsageSink for UsageLogRepository {
    async fn record(&self, log: ApiUsageLog) -> Result<()> {
        self.insert(&log).await
    }
}
