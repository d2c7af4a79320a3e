//! Intake runs as a spawned task that reports through an unbounded channel, so the classifier's
//! synchronous progress callback can emit events without awaiting.

use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio_stream::wrappers::UnboundedReceiverStream;

use likeness_core::models::{ApiUsageLog, MediaSource, MediaType, NewMediaItem};
use likeness_db::{MediaItemStore, UsageSink};
use likeness_plugins::ensemble::{UNIT_COST_MILLI_USD, USER_INFO_UNITS};
use likeness_plugins::{BatchProgress, BrokerError, FaceClassifier, FeedKind, ProfileBroker};

use super::events::{AnalyzedPhoto, CollectedReel, IntakeEvent, IntakeSummary, LogStatus};
use super::posts::{dedup_by_url, extract_photos, next_cursor};
use super::reels::extract_reels;

const USAGE_API: &str = "ensemble";
const USER_INFO_ENDPOINT: &str = "/instagram/user/info";

type Events = UnboundedSender<IntakeEvent>;

/// Sends `event`; a closed receiver means the client went away and is not an error.
fn emit(tx: &Events, event: IntakeEvent) {
    let _ = tx.send(event);
}

#[derive(Clone)]
pub struct IntakePipeline {
    broker: Arc<dyn ProfileBroker>,
    classifier: Arc<dyn FaceClassifier>,
    media: Arc<dyn MediaItemStore>,
    usage: Arc<dyn UsageSink>,
}

impl IntakePipeline {
    pub fn new(
        broker: Arc<dyn ProfileBroker>,
        classifier: Arc<dyn FaceClassifier>,
        media: Arc<dyn MediaItemStore>,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            broker,
            classifier,
            media,
            usage,
        }
    }

    /// Collects, classifies and saves the profile's photos.
    pub fn analyze_photos(
        &self,
        username: String,
        session_id: Option<String>,
    ) -> UnboundedReceiverStream<IntakeEvent> {
        let (tx, rx) = unbounded_channel();
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline
                .run_photos(&username, session_id.as_deref(), &tx)
                .await
            {
                tracing::error!(username = %username, error = %e, "Photo intake failed");
                emit(&tx, IntakeEvent::error(e.to_string()));
            }
        });
        UnboundedReceiverStream::new(rx)
    }

    /// Collects and saves the profile's reels.
    pub fn collect_reels(
        &self,
        username: String,
        session_id: Option<String>,
    ) -> UnboundedReceiverStream<IntakeEvent> {
        let (tx, rx) = unbounded_channel();
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline
                .run_reels(&username, session_id.as_deref(), &tx)
                .await
            {
                tracing::error!(username = %username, error = %e, "Reel intake failed");
                emit(&tx, IntakeEvent::error(e.to_string()));
            }
        });
        UnboundedReceiverStream::new(rx)
    }

    async fn resolve_user_id(
        &self,
        username: &str,
        session_id: Option<&str>,
        tx: &Events,
    ) -> Result<String, BrokerError> {
        emit(
            tx,
            IntakeEvent::log(
                1,
                format!("Getting Instagram User ID for @{}", username),
                LogStatus::Processing,
            ),
        );

        let result = self.broker.user_id(username).await;
        // Billed whenever the broker answered, even without a usable id.
        if matches!(result, Ok(_) | Err(BrokerError::MissingUserId { .. })) {
            self.record_usage(session_id).await;
        }
        let user_id = result?;

        emit(
            tx,
            IntakeEvent::log(1, format!("User ID retrieved: {}", user_id), LogStatus::Complete),
        );
        Ok(user_id)
    }

    async fn record_usage(&self, session_id: Option<&str>) {
        let Some(session_id) = session_id else {
            return;
        };
        let log = ApiUsageLog::new(
            session_id,
            USAGE_API,
            USER_INFO_ENDPOINT,
            USER_INFO_UNITS,
            Decimal::new(UNIT_COST_MILLI_USD, 3),
        );
        if let Err(e) = self.usage.record(log).await {
            tracing::warn!(session_id, error = %e, "Failed to record API usage");
        }
    }

    /// Reads pages until the broker stops returning a cursor. Empty pages do not end the loop.
    ///
    /// A cursor identical to the one just sent also ends the loop, with a `warning` log event.
    async fn paginate(
        &self,
        kind: FeedKind,
        user_id: &str,
        tx: &Events,
        mut on_page: impl FnMut(&Value),
    ) -> Result<usize, BrokerError> {
        let mut cursor: Option<String> = None;
        let mut pages = 0;
        loop {
            let page = self
                .broker
                .feed_page(kind, user_id, cursor.as_deref())
                .await?;
            pages += 1;
            on_page(&page);

            match next_cursor(&page) {
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    tracing::warn!(cursor = %next, pages, "Broker repeated cursor, stopping");
                    emit(
                        tx,
                        IntakeEvent::log(
                            2,
                            format!(
                                "Stopped after {} pages: broker repeated cursor {}",
                                pages, next
                            ),
                            LogStatus::Warning,
                        ),
                    );
                    break;
                }
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::debug!(kind = kind.path(), pages, "Pagination finished");
        Ok(pages)
    }

    #[tracing::instrument(skip(self, tx), fields(intake = "photos"))]
    async fn run_photos(
        &self,
        username: &str,
        session_id: Option<&str>,
        tx: &Events,
    ) -> anyhow::Result<()> {
        let start = Instant::now();
        let user_id = self.resolve_user_id(username, session_id, tx).await?;

        emit(tx, IntakeEvent::log(2, "Fetching photos and reels", LogStatus::Processing));
        let mut collected = Vec::new();
        self.paginate(FeedKind::Posts, &user_id, tx, |page| {
            extract_photos(page, &mut collected)
        })
        .await?;
        let unique = dedup_by_url(collected);
        emit(
            tx,
            IntakeEvent::Log {
                step: 2,
                message: format!("Found {} photos", unique.len()),
                status: LogStatus::Complete,
                photo_count: Some(unique.len()),
                total_photos: None,
                reel_count: None,
            },
        );

        let urls: Vec<String> = unique.iter().map(|p| p.url.clone()).collect();
        emit(
            tx,
            IntakeEvent::Log {
                step: 3,
                message: format!("Starting Gemini analysis of {} photos", urls.len()),
                status: LogStatus::Processing,
                photo_count: None,
                total_photos: Some(urls.len()),
                reel_count: None,
            },
        );

        let progress_tx = tx.clone();
        let on_progress = move |progress: BatchProgress| {
            emit(&progress_tx, IntakeEvent::Progress(progress));
        };
        let outcome = self.classifier.classify(&urls, &on_progress).await;

        let passed: Vec<AnalyzedPhoto> = unique
            .into_iter()
            .filter_map(|photo| {
                outcome
                    .all_results
                    .iter()
                    .find(|r| r.url == photo.url && r.passed())
                    .map(|result| AnalyzedPhoto {
                        photo,
                        gemini_result: result.clone(),
                    })
            })
            .collect();

        let items: Vec<NewMediaItem> = passed
            .iter()
            .map(|p| NewMediaItem {
                caption: Some(p.photo.caption.clone()),
                instagram_id: Some(p.photo.id.clone()),
                instagram_username: Some(username.to_string()),
                ..NewMediaItem::new(MediaType::Photo, MediaSource::Instagram, p.photo.url.clone())
            })
            .collect();
        self.save(items).await;

        tracing::info!(
            analyzed = urls.len(),
            passed = passed.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Photo intake complete"
        );
        emit(
            tx,
            IntakeEvent::Complete(IntakeSummary::Photos {
                total_analyzed: urls.len(),
                total_passed: passed.len(),
                photos: passed,
            }),
        );
        Ok(())
    }

    #[tracing::instrument(skip(self, tx), fields(intake = "reels"))]
    async fn run_reels(
        &self,
        username: &str,
        session_id: Option<&str>,
        tx: &Events,
    ) -> anyhow::Result<()> {
        let start = Instant::now();
        let user_id = self.resolve_user_id(username, session_id, tx).await?;

        emit(tx, IntakeEvent::log(2, "Fetching Instagram reels", LogStatus::Processing));
        let mut reels: Vec<CollectedReel> = Vec::new();
        self.paginate(FeedKind::Reels, &user_id, tx, |page| {
            extract_reels(page, &mut reels)
        })
        .await?;

        let items: Vec<NewMediaItem> = reels
            .iter()
            .map(|r| NewMediaItem {
                thumbnail_url: r.thumbnail.clone(),
                caption: Some(r.caption.clone()),
                instagram_id: Some(r.id.clone()),
                instagram_username: Some(username.to_string()),
                ..NewMediaItem::new(MediaType::Video, MediaSource::Instagram, r.url.clone())
            })
            .collect();
        self.save(items).await;

        emit(
            tx,
            IntakeEvent::Log {
                step: 2,
                message: format!("Found {} reels", reels.len()),
                status: LogStatus::Complete,
                photo_count: None,
                total_photos: None,
                reel_count: Some(reels.len()),
            },
        );
        tracing::info!(
            reels = reels.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Reel intake complete"
        );
        emit(
            tx,
            IntakeEvent::Complete(IntakeSummary::Reels {
                total_reels: reels.len(),
                reels,
            }),
        );
        Ok(())
    }

    /// Persists intake results. A failed insert is logged and does not fail the stream.
    async fn save(&self, items: Vec<NewMediaItem>) {
        if items.is_empty() {
            return;
        }
        let count = items.len();
        match self.media.append(items).await {
            Ok(_) => tracing::info!(count, "Saved media items"),
            Err(e) => tracing::error!(count, error = %e, "Failed to save media items"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeBroker, FakeClassifier, InMemoryMediaStore, RecordingUsageSink};
    use futures::StreamExt;
    use serde_json::json;

    struct Fixture {
        pipeline: IntakePipeline,
        broker: Arc<FakeBroker>,
        media: Arc<InMemoryMediaStore>,
        usage: Arc<RecordingUsageSink>,
    }

    fn fixture(broker: FakeBroker, passing: &[&str]) -> Fixture {
        let broker = Arc::new(broker);
        let media = Arc::new(InMemoryMediaStore::new());
        let usage = Arc::new(RecordingUsageSink::default());
        let pipeline = IntakePipeline::new(
            broker.clone(),
            Arc::new(FakeClassifier::passing(passing)),
            media.clone(),
            usage.clone(),
        );
        Fixture {
            pipeline,
            broker,
            media,
            usage,
        }
    }

    fn image(id: &str) -> Value {
        json!({"node": {
            "__typename": "GraphImage",
            "id": id,
            "display_url": format!("https://cdn.test/{}.jpg", id)
        }})
    }

    async fn collect(stream: UnboundedReceiverStream<IntakeEvent>) -> Vec<Value> {
        stream
            .map(|e| serde_json::to_value(&e).unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn photo_intake_paginates_dedups_filters_and_saves() {
        let broker = FakeBroker::new("42").with_pages(
            FeedKind::Posts,
            vec![
                json!({"data": {"posts": [image("a"), image("b")], "last_cursor": "c1"}}),
                json!({"data": {"posts": [], "last_cursor": "c2"}}),
                json!({"data": {"posts": [image("a"), image("c")]}}),
            ],
        );
        let f = fixture(broker, &["https://cdn.test/a.jpg", "https://cdn.test/c.jpg"]);

        let events = collect(f.pipeline.analyze_photos("jane".into(), Some("s1".into()))).await;

        assert_eq!(
            f.broker.cursors(),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
        let types: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(types, vec!["log", "log", "log", "log", "log", "progress", "complete"]);
        assert_eq!(events[3]["photoCount"], 3);

        let complete = events.last().unwrap();
        assert_eq!(complete["totalAnalyzed"], 3);
        assert_eq!(complete["totalPassed"], 2);
        assert_eq!(complete["photos"][0]["url"], "https://cdn.test/a.jpg");
        assert_eq!(complete["photos"][0]["geminiResult"]["decision"], "yes");

        let saved = f.media.items();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|i| i.media_type == MediaType::Photo
            && i.source == MediaSource::Instagram
            && i.instagram_username.as_deref() == Some("jane")));
        assert_eq!(saved[0].display_order, 1);
        assert_eq!(saved[1].display_order, 2);

        let logs = f.usage.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].units, 3);
        assert_eq!(logs[0].cost_usd, Decimal::new(3, 3));
    }

    #[tokio::test]
    async fn absent_cursor_on_first_page_reads_once() {
        let broker = FakeBroker::new("42").with_pages(
            FeedKind::Reels,
            vec![json!({"data": {"reels": [
                {"media": {"code": "R1", "video_url": "https://cdn.test/r1.mp4"}}
            ], "last_cursor": null}})],
        );
        let f = fixture(broker, &[]);

        let events = collect(f.pipeline.collect_reels("jane".into(), None)).await;

        assert_eq!(f.broker.cursors(), vec![None]);
        let complete = events.last().unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["totalReels"], 1);
        assert_eq!(f.media.items()[0].media_type, MediaType::Video);
        assert!(f.usage.logs().is_empty());
    }

    #[tokio::test]
    async fn repeated_cursor_stops_paging_with_warning() {
        let broker = FakeBroker::new("42").with_pages(
            FeedKind::Posts,
            vec![
                json!({"data": {"posts": [image("a")], "last_cursor": "c1"}}),
                json!({"data": {"posts": [image("b")], "last_cursor": "c1"}}),
                json!({"data": {"posts": [image("c")]}}),
            ],
        );
        let f = fixture(broker, &["https://cdn.test/a.jpg"]);

        let events = collect(f.pipeline.analyze_photos("jane".into(), None)).await;

        assert_eq!(f.broker.cursors(), vec![None, Some("c1".to_string())]);
        let warnings: Vec<&Value> = events
            .iter()
            .filter(|e| e["type"] == "log" && e["status"] == "warning")
            .collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0]["step"], 2);
        assert!(warnings[0]["message"]
            .as_str()
            .unwrap()
            .contains("repeated cursor c1"));
        let complete = events.last().unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["totalAnalyzed"], 2);
    }

    #[tokio::test]
    async fn unknown_user_ends_stream_with_error() {
        let f = fixture(FakeBroker::unknown_user(), &[]);

        let events = collect(f.pipeline.analyze_photos("ghost".into(), Some("s1".into()))).await;

        let last = events.last().unwrap();
        assert_eq!(last["type"], "error");
        assert!(last["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to get user ID for username: ghost"));
        assert_eq!(f.usage.logs().len(), 1);
    }

    #[tokio::test]
    async fn save_failure_does_not_fail_stream() {
        let broker = FakeBroker::new("42").with_pages(
            FeedKind::Posts,
            vec![json!({"data": {"posts": [image("a")]}})],
        );
        let f = fixture(broker, &["https://cdn.test/a.jpg"]);
        f.media.fail_appends();

        let events = collect(f.pipeline.analyze_photos("jane".into(), None)).await;

        assert_eq!(events.last().unwrap()["type"], "complete");
        assert!(f.media.items().is_empty());
    }

    #[tokio::test]
    async fn broker_failure_mid_pagination_emits_error() {
        let broker = FakeBroker::new("42").with_pages(
            FeedKind::Posts,
            vec![json!({"data": {"posts": [], "last_cursor": "c1"}})],
        );
        let f = fixture(broker, &[]);

        let events = collect(f.pipeline.analyze_photos("jane".into(), None)).await;

        assert_eq!(events.last().unwrap()["type"], "error");
        assert!(events.iter().all(|e| e["type"] != "complete"));
    }
}
