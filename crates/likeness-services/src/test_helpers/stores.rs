use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

use likeness_core::models::{
    ApiUsageLog, GenerationState, Identity, IdentityStatus, MediaItem, NewIdentity, NewMediaItem,
};
use likeness_db::{ClaimOutcome, ConflictRule, DeleteOutcome, IdentityStore, MediaItemStore, UsageSink};
use likeness_storage::{keys, Storage, StorageBackend, StorageError, StorageResult};

/// Identity store backed by a `Vec`, with injectable write failures.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    rows: Mutex<Vec<Identity>>,
    /// Number of upcoming `mark_completed` calls that fail.
    completion_failures: AtomicU32,
    fail_creates: Mutex<bool>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Identity>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    pub fn fail_next_completions(&self, n: u32) {
        self.completion_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_creates(&self) {
        *self.fail_creates.lock().unwrap() = true;
    }

    pub fn rows(&self) -> Vec<Identity> {
        self.rows.lock().unwrap().clone()
    }

    pub fn insert(&self, identity: Identity) {
        self.rows.lock().unwrap().push(identity);
    }

    /// A row as it would come back from the database.
    pub fn identity(record: NewIdentity) -> Identity {
        let now = Utc::now();
        Identity {
            id: Uuid::new_v4(),
            name: record.name,
            source_photos: record.source_photos,
            generated_image_url: None,
            status: IdentityStatus::Processing,
            src: record.src,
            gen_id: record.gen_id,
            gen_st: record.gen_st,
            instagram_username: record.instagram_username,
            is_primary: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn conflicts(rows: &[Identity], username: &str, rule: ConflictRule) -> bool {
        rows.iter()
            .filter(|r| r.instagram_username.as_deref() == Some(username))
            .any(|r| match rule {
                ConflictRule::AnyInFlight => r.is_in_flight(),
                ConflictRule::InFlightSource(src) => r.is_in_flight() && r.src == src,
                ConflictRule::ActiveIdentity => {
                    r.status == IdentityStatus::Processing
                        || (r.status == IdentityStatus::Completed
                            && r.generated_image_url.is_some())
                }
            })
    }

    fn insert_all(&self, records: Vec<NewIdentity>) -> Result<Vec<Identity>> {
        if *self.fail_creates.lock().unwrap() {
            return Err(anyhow!("insert failed"));
        }
        let created: Vec<Identity> = records.into_iter().map(Self::identity).collect();
        self.rows.lock().unwrap().extend(created.iter().cloned());
        Ok(created)
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn create_batch(&self, records: Vec<NewIdentity>) -> Result<Vec<Identity>> {
        self.insert_all(records)
    }

    async fn claim_batch(
        &self,
        username: &str,
        rule: ConflictRule,
        records: Vec<NewIdentity>,
    ) -> Result<ClaimOutcome> {
        if Self::conflicts(&self.rows.lock().unwrap(), username, rule) {
            return Ok(ClaimOutcome::Conflict);
        }
        Ok(ClaimOutcome::Created(self.insert_all(records)?))
    }

    async fn has_in_flight_batch(&self, username: &str, rule: ConflictRule) -> Result<bool> {
        Ok(Self::conflicts(&self.rows.lock().unwrap(), username, rule))
    }

    async fn get(&self, id: Uuid) -> Result<Option<Identity>> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, username: Option<&str>) -> Result<Vec<Identity>> {
        let mut rows: Vec<Identity> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| username.is_none() || r.instagram_username.as_deref() == username)
            .cloned()
            .collect();
        rows.reverse();
        Ok(rows)
    }

    async fn seedream_urls(&self, username: &str) -> Result<Vec<String>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| {
                r.instagram_username.as_deref() == Some(username)
                    && r.src == likeness_core::models::IdentitySource::Sd
            })
            .filter_map(|r| r.generated_image_url.clone())
            .collect())
    }

    async fn mark_completed(&self, id: Uuid, url: &str) -> Result<bool> {
        let pending = self.completion_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.completion_failures.store(pending - 1, Ordering::SeqCst);
            return Err(anyhow!("connection reset"));
        }
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|r| r.id == id && r.status != IdentityStatus::Failed)
        {
            Some(row) => {
                row.generated_image_url = Some(url.to_string());
                row.status = IdentityStatus::Completed;
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_failed(&self, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows
            .iter_mut()
            .find(|r| r.id == id && r.status == IdentityStatus::Processing)
        {
            Some(row) => {
                row.status = IdentityStatus::Failed;
                row.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn finish_batch(&self, gen_id: Uuid) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let mut changed = 0;
        for row in rows
            .iter_mut()
            .filter(|r| r.gen_id == Some(gen_id) && r.gen_st != Some(GenerationState::Done))
        {
            row.gen_st = Some(GenerationState::Done);
            row.updated_at = Utc::now();
            changed += 1;
        }
        Ok(changed)
    }

    async fn delete(&self, id: Uuid) -> Result<DeleteOutcome> {
        let mut rows = self.rows.lock().unwrap();
        match rows.iter().position(|r| r.id == id) {
            None => Ok(DeleteOutcome::NotFound),
            Some(i) if rows[i].status == IdentityStatus::Failed => Ok(DeleteOutcome::Retained),
            Some(i) => {
                rows.remove(i);
                Ok(DeleteOutcome::Deleted)
            }
        }
    }

    async fn set_primary(&self, username: &str, id: Uuid) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let belongs = rows
            .iter()
            .any(|r| r.id == id && r.instagram_username.as_deref() == Some(username));
        if !belongs {
            return Ok(false);
        }
        for row in rows
            .iter_mut()
            .filter(|r| r.instagram_username.as_deref() == Some(username))
        {
            row.is_primary = row.id == id;
        }
        Ok(true)
    }

    async fn get_primary(&self, username: &str) -> Result<Option<Identity>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.is_primary && r.instagram_username.as_deref() == Some(username))
            .cloned())
    }
}

#[derive(Default)]
pub struct InMemoryMediaStore {
    items: Mutex<Vec<MediaItem>>,
    fail_appends: Mutex<bool>,
}

impl InMemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<MediaItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn fail_appends(&self) {
        *self.fail_appends.lock().unwrap() = true;
    }
}

#[async_trait]
impl MediaItemStore for InMemoryMediaStore {
    async fn list(&self) -> Result<Vec<MediaItem>> {
        let mut items = self.items();
        items.sort_by_key(|i| i.display_order);
        Ok(items)
    }

    async fn get(&self, id: Uuid) -> Result<Option<MediaItem>> {
        Ok(self.items().into_iter().find(|i| i.id == id))
    }

    async fn find_video_by_url(&self, url: &str) -> Result<Option<Uuid>> {
        Ok(self
            .items()
            .into_iter()
            .find(|i| i.url == url && i.media_type == likeness_core::models::MediaType::Video)
            .map(|i| i.id))
    }

    async fn append(&self, new_items: Vec<NewMediaItem>) -> Result<Vec<MediaItem>> {
        if *self.fail_appends.lock().unwrap() {
            return Err(anyhow!("insert failed"));
        }
        let mut items = self.items.lock().unwrap();
        let start = items.iter().map(|i| i.display_order).max().unwrap_or(0) + 1;
        let created: Vec<MediaItem> = new_items
            .into_iter()
            .enumerate()
            .map(|(n, item)| MediaItem {
                id: Uuid::new_v4(),
                media_type: item.media_type,
                source: item.source,
                url: item.url,
                thumbnail_url: item.thumbnail_url,
                caption: item.caption,
                instagram_id: item.instagram_id,
                instagram_username: item.instagram_username,
                parent_video_id: item.parent_video_id,
                display_order: start + n as i32,
                created_at: Utc::now(),
            })
            .collect();
        items.extend(created.iter().cloned());
        Ok(created)
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|i| i.id != id);
        Ok(items.len() < before)
    }

    async fn delete_all(&self) -> Result<u64> {
        let mut items = self.items.lock().unwrap();
        let n = items.len() as u64;
        items.clear();
        Ok(n)
    }
}

/// Object store held in a map, published under `https://media.test`.
pub struct InMemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    public_url: String,
    failing_puts: AtomicU32,
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            public_url: "https://media.test".to_string(),
            failing_puts: AtomicU32::new(0),
        }
    }
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.lock().unwrap().get(key).map(|(_, ct)| ct.clone())
    }

    pub fn insert(&self, key: &str, data: Vec<u8>, content_type: &str) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
    }

    pub fn fail_next_puts(&self, n: u32) {
        self.failing_puts.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<String> {
        keys::validate_key(key)?;
        let pending = self.failing_puts.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_puts.store(pending - 1, Ordering::SeqCst);
            return Err(StorageError::UploadFailed("bucket unavailable".to_string()));
        }
        self.insert(key, data, content_type);
        Ok(keys::public_url(&self.public_url, key))
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    fn public_base_url(&self) -> &str {
        &self.public_url
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[derive(Default)]
pub struct RecordingUsageSink {
    logs: Mutex<Vec<ApiUsageLog>>,
}

impl RecordingUsageSink {
    pub fn logs(&self) -> Vec<ApiUsageLog> {
        self.logs.lock().unwrap().clone()
    }
}

#[async_trait]
impl UsageSink for RecordingUsageSink {
    async fn record(&self, log: ApiUsageLog) -> Result<()> {
        self.logs.lock().unwrap().push(log);
        Ok(())
    }
}
