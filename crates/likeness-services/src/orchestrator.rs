//! Sequential batch generation for anchor and variant records.
//!
//! Each record is generated, uploaded and marked independently; one record failing never stops
//! the loop, and the batch is always closed with `gen_st = 'done'` at the end.

use base64::Engine;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use uuid::Uuid;

use likeness_core::constants::ANCHOR_RECORDS_PER_MUTATION;
use likeness_core::models::{Identity, IdentitySource, Mutation};
use likeness_db::IdentityStore;
use likeness_plugins::ImageGenerator;
use likeness_storage::Storage;

use crate::retry::{self, RetryPolicy};

const OUTPUT_CONTENT_TYPE: &str = "image/jpeg";

/// Everything one orchestrator invocation needs.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub records: Vec<Identity>,
    pub mutations: Vec<Mutation>,
    pub reference_image_urls: Vec<String>,
    pub generation_id: Uuid,
    pub source: IdentitySource,
    /// Template used for mutations without a literal prompt.
    pub base_prompt: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub total: usize,
    pub completed: usize,
    /// Everything not completed, including records left `processing` by a failed update.
    pub failed: usize,
}

/// Mutation used for record `index`: anchors switch mutation every
/// [`ANCHOR_RECORDS_PER_MUTATION`] records, other kinds take one mutation per record.
pub fn mutation_index(source: IdentitySource, index: usize) -> usize {
    match source {
        IdentitySource::Anc => (index / ANCHOR_RECORDS_PER_MUTATION).min(1),
        IdentitySource::Var | IdentitySource::Sd => index,
    }
}

/// Storage key for a generated image.
pub fn output_file_name(
    source: IdentitySource,
    record_id: Uuid,
    mutation_id: &str,
    index: usize,
) -> String {
    match source {
        IdentitySource::Anc => format!(
            "anc_{}_{}_{}.jpg",
            record_id,
            mutation_id,
            (index % ANCHOR_RECORDS_PER_MUTATION) + 1
        ),
        _ => format!("{}_{}_{}.jpg", source.as_str(), record_id, mutation_id),
    }
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    identities: Arc<dyn IdentityStore>,
    storage: Arc<dyn Storage>,
    generator: Arc<dyn ImageGenerator>,
    generation_retry: RetryPolicy,
    update_retry: RetryPolicy,
}

impl BatchOrchestrator {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        storage: Arc<dyn Storage>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            identities,
            storage,
            generator,
            generation_retry: RetryPolicy::generation(),
            update_retry: RetryPolicy::record_update(),
        }
    }

    /// Runs the batch on its own task. Dropping the handle does not cancel it, so a caller
    /// that disconnects mid-batch still leaves every record closed with `gen_st = 'done'`.
    pub fn spawn(&self, job: BatchJob) -> JoinHandle<BatchOutcome> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run(job).await })
    }

    /// Processes every record in order, then closes the batch.
    #[tracing::instrument(skip(self, job), fields(gen_id = %job.generation_id, src = %job.source, records = job.records.len()))]
    pub async fn run(&self, job: BatchJob) -> BatchOutcome {
        let start = Instant::now();
        let mut outcome = BatchOutcome {
            total: job.records.len(),
            ..BatchOutcome::default()
        };

        for (index, record) in job.records.iter().enumerate() {
            if self.process_record(&job, index, record).await {
                outcome.completed += 1;
            }
        }
        outcome.failed = outcome.total - outcome.completed;

        self.finish(job.generation_id).await;

        tracing::info!(
            total = outcome.total,
            completed = outcome.completed,
            failed = outcome.failed,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Batch finished"
        );
        outcome
    }

    /// Returns `true` once the record is stored as completed.
    async fn process_record(&self, job: &BatchJob, index: usize, record: &Identity) -> bool {
        let Some(mutation) = job.mutations.get(mutation_index(job.source, index)) else {
            tracing::error!(identity_id = %record.id, index, "No mutation for record");
            self.mark_failed(record.id).await;
            return false;
        };

        let (prompt, mutation_text) = match mutation.prompt.as_deref() {
            Some(literal) => (literal, ""),
            None => (job.base_prompt.as_str(), mutation.mutation.as_str()),
        };

        tracing::info!(
            identity_id = %record.id,
            index,
            mutation = %mutation.id,
            "Generating image"
        );

        let generated = retry::execute(&self.generation_retry, "generate_image", || {
            self.generator
                .generate(prompt, &job.reference_image_urls, mutation_text)
        })
        .await;

        let image_base64 = match generated {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(identity_id = %record.id, error = %e, "Image generation failed");
                self.mark_failed(record.id).await;
                return false;
            }
        };

        let bytes = match base64::engine::general_purpose::STANDARD.decode(image_base64.trim()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(identity_id = %record.id, error = %e, "Generated image is not valid base64");
                self.mark_failed(record.id).await;
                return false;
            }
        };

        let key = output_file_name(job.source, record.id, &mutation.id, index);
        let url = match self.storage.put(&key, bytes, OUTPUT_CONTENT_TYPE).await {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(identity_id = %record.id, key = %key, error = %e, "Upload failed");
                self.mark_failed(record.id).await;
                return false;
            }
        };

        let updated = retry::execute_linear(&self.update_retry, "mark_completed", || {
            self.identities.mark_completed(record.id, &url)
        })
        .await;

        match updated {
            Ok(true) => {
                tracing::info!(identity_id = %record.id, url = %url, "Record completed");
                true
            }
            Ok(false) => {
                tracing::warn!(identity_id = %record.id, "Record was not updatable, skipping");
                false
            }
            Err(e) => {
                // The image exists in storage but the row stays `processing`.
                tracing::error!(identity_id = %record.id, url = %url, error = %e, "Failed to store generated URL");
                false
            }
        }
    }

    async fn mark_failed(&self, id: Uuid) {
        if let Err(e) = self.identities.mark_failed(id).await {
            tracing::error!(identity_id = %id, error = %e, "Failed to mark record failed");
        }
    }

    async fn finish(&self, generation_id: Uuid) {
        match retry::execute_linear(&self.update_retry, "finish_batch", || {
            self.identities.finish_batch(generation_id)
        })
        .await
        {
            Ok(rows) => tracing::debug!(rows, "Batch marked done"),
            Err(e) => tracing::error!(error = %e, "Failed to mark batch done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{InMemoryIdentityStore, InMemoryStorage, ScriptedGenerator};
    use likeness_core::models::{GenerationState, IdentityStatus, NewIdentity};
    use likeness_core::prompts::{anchor_mutations, variant_mutations, ANCHOR_BASE_PROMPT};

    const IMAGE_B64: &str = "aGVsbG8="; // "hello"

    fn seed_batch(
        store: &InMemoryIdentityStore,
        source: IdentitySource,
        n: usize,
    ) -> (Uuid, Vec<Identity>) {
        let gen_id = Uuid::new_v4();
        let records = (0..n)
            .map(|i| {
                let row = InMemoryIdentityStore::identity(NewIdentity {
                    name: format!("Record {}", i + 1),
                    source_photos: vec!["https://media.test/sd.jpg".to_string()],
                    src: source,
                    gen_id: Some(gen_id),
                    gen_st: Some(GenerationState::Gen),
                    instagram_username: Some("jane".to_string()),
                });
                store.insert(row.clone());
                row
            })
            .collect();
        (gen_id, records)
    }

    fn job(source: IdentitySource, gen_id: Uuid, records: Vec<Identity>) -> BatchJob {
        BatchJob {
            records,
            mutations: match source {
                IdentitySource::Anc => anchor_mutations(),
                _ => variant_mutations(),
            },
            reference_image_urls: vec!["https://media.test/sd.jpg".to_string()],
            generation_id: gen_id,
            source,
            base_prompt: ANCHOR_BASE_PROMPT.to_string(),
        }
    }

    #[test]
    fn anchor_records_split_across_two_mutations() {
        let indices: Vec<usize> = (0..10)
            .map(|i| mutation_index(IdentitySource::Anc, i))
            .collect();
        assert_eq!(indices, vec![0, 0, 0, 0, 0, 1, 1, 1, 1, 1]);
        assert_eq!(mutation_index(IdentitySource::Var, 3), 3);
    }

    #[test]
    fn output_names_are_deterministic() {
        let id = Uuid::nil();
        assert_eq!(
            output_file_name(IdentitySource::Anc, id, "angle-right", 7),
            format!("anc_{}_angle-right_3.jpg", id)
        );
        assert_eq!(
            output_file_name(IdentitySource::Var, id, "light-left", 2),
            format!("var_{}_light-left.jpg", id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn anchor_batch_completes_every_record() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        let generator = Arc::new(ScriptedGenerator::succeeding(IMAGE_B64));
        let (gen_id, records) = seed_batch(&store, IdentitySource::Anc, 10);

        let orchestrator = BatchOrchestrator::new(store.clone(), storage.clone(), generator.clone());
        let outcome = orchestrator
            .run(job(IdentitySource::Anc, gen_id, records))
            .await;

        assert_eq!(
            outcome,
            BatchOutcome {
                total: 10,
                completed: 10,
                failed: 0
            }
        );

        let rows = store.rows();
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|r| r.status == IdentityStatus::Completed
            && r.generated_image_url.is_some()
            && r.gen_st == Some(GenerationState::Done)));

        let calls = generator.calls();
        let mutations = anchor_mutations();
        assert!(calls[..5].iter().all(|c| c.mutation == mutations[0].mutation));
        assert!(calls[5..].iter().all(|c| c.mutation == mutations[1].mutation));
        assert!(calls.iter().all(|c| c.prompt == ANCHOR_BASE_PROMPT));

        assert_eq!(storage.keys().len(), 10);
        assert!(storage
            .keys()
            .iter()
            .all(|k| storage.content_type(k).as_deref() == Some("image/jpeg")));
    }

    #[tokio::test(start_paused = true)]
    async fn variant_uses_literal_prompt_per_record() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        let generator = Arc::new(ScriptedGenerator::succeeding(IMAGE_B64));
        let (gen_id, records) = seed_batch(&store, IdentitySource::Var, 5);

        let orchestrator = BatchOrchestrator::new(store.clone(), storage, generator.clone());
        orchestrator
            .run(job(IdentitySource::Var, gen_id, records))
            .await;

        let calls = generator.calls();
        let expected: Vec<String> = variant_mutations()
            .into_iter()
            .filter_map(|m| m.prompt)
            .collect();
        assert_eq!(
            calls.iter().map(|c| c.prompt.clone()).collect::<Vec<_>>(),
            expected
        );
        assert!(calls.iter().all(|c| c.mutation.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn generation_failure_marks_record_failed_and_continues() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        let generator = Arc::new(ScriptedGenerator::succeeding(IMAGE_B64));
        let mutations = variant_mutations();
        // Second record exhausts all three attempts.
        generator.script(
            mutations[1].prompt.as_deref().unwrap(),
            vec![
                Err("overloaded".into()),
                Err("overloaded".into()),
                Err("overloaded".into()),
            ],
        );
        let (gen_id, records) = seed_batch(&store, IdentitySource::Var, 3);
        let failing_id = records[1].id;

        let orchestrator = BatchOrchestrator::new(store.clone(), storage, generator.clone());
        let outcome = orchestrator
            .run(job(IdentitySource::Var, gen_id, records))
            .await;

        assert_eq!(outcome.total, 3);
        assert_eq!(outcome.completed, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(generator.calls().len(), 5);

        let rows = store.rows();
        let failed = rows.iter().find(|r| r.id == failing_id).unwrap();
        assert_eq!(failed.status, IdentityStatus::Failed);
        assert!(failed.generated_image_url.is_none());
        assert!(rows.iter().all(|r| r.gen_st == Some(GenerationState::Done)));
    }

    #[tokio::test(start_paused = true)]
    async fn retried_generation_succeeds() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        let generator = Arc::new(ScriptedGenerator::succeeding(IMAGE_B64));
        let mutations = anchor_mutations();
        generator.script(
            &mutations[0].mutation,
            vec![Err("no image".into()), Err("no image".into())],
        );
        let (gen_id, records) = seed_batch(&store, IdentitySource::Anc, 1);

        let orchestrator = BatchOrchestrator::new(store.clone(), storage, generator.clone());
        let outcome = orchestrator
            .run(job(IdentitySource::Anc, gen_id, records))
            .await;

        assert_eq!(outcome.completed, 1);
        assert_eq!(generator.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_update_failure_leaves_record_processing() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        let generator = Arc::new(ScriptedGenerator::succeeding(IMAGE_B64));
        store.fail_next_completions(5);
        let (gen_id, records) = seed_batch(&store, IdentitySource::Var, 1);

        let orchestrator = BatchOrchestrator::new(store.clone(), storage.clone(), generator);
        let outcome = orchestrator
            .run(job(IdentitySource::Var, gen_id, records))
            .await;

        assert_eq!(outcome.completed, 0);
        assert_eq!(outcome.failed, 1);
        let row = &store.rows()[0];
        assert_eq!(row.status, IdentityStatus::Processing);
        assert_eq!(row.gen_st, Some(GenerationState::Done));
        assert_eq!(storage.keys().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_update_failure_is_retried() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        let generator = Arc::new(ScriptedGenerator::succeeding(IMAGE_B64));
        store.fail_next_completions(2);
        let (gen_id, records) = seed_batch(&store, IdentitySource::Var, 1);

        let orchestrator = BatchOrchestrator::new(store.clone(), storage, generator);
        let outcome = orchestrator
            .run(job(IdentitySource::Var, gen_id, records))
            .await;

        assert_eq!(outcome.completed, 1);
        assert_eq!(store.rows()[0].status, IdentityStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn upload_failure_marks_record_failed() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let storage = Arc::new(InMemoryStorage::new());
        storage.fail_next_puts(1);
        let generator = Arc::new(ScriptedGenerator::succeeding(IMAGE_B64));
        let (gen_id, records) = seed_batch(&store, IdentitySource::Var, 2);

        let orchestrator = BatchOrchestrator::new(store.clone(), storage, generator);
        let outcome = orchestrator
            .run(job(IdentitySource::Var, gen_id, records))
            .await;

        assert_eq!(outcome.completed, 1);
        assert_eq!(store.rows()[0].status, IdentityStatus::Failed);
        assert_eq!(store.rows()[1].status, IdentityStatus::Completed);
    }
}
