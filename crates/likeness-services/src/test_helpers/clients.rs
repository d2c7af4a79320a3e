use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use likeness_plugins::{
    face_classifier::{top_selections, ProgressCallback},
    BatchProgress, BrokerError, ClassificationOutcome, Decision, EnhanceError, Enhancer,
    FaceAnalysis, FaceClassifier, FeedKind, GenerationError, ImageGenerator, ProfileBroker,
    ReferenceError, ReferenceSource,
};

/// Image generator whose results are keyed by mutation text.
///
/// Each call for a mutation pops the next scripted result; once the script is exhausted the
/// generator falls back to `default`.
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    default: Result<String, String>,
    calls: Mutex<Vec<GeneratorCall>>,
    delay: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorCall {
    pub prompt: String,
    pub references: Vec<String>,
    pub mutation: String,
}

impl ScriptedGenerator {
    /// Always succeeds with `image_base64`.
    pub fn succeeding(image_base64: &str) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: Ok(image_base64.to_string()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: Err(message.to_string()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleeps for `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script(&self, key: &str, results: Vec<Result<String, String>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(key.to_string(), results.into());
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        prompt: &str,
        reference_images: &[String],
        mutation: &str,
    ) -> Result<String, GenerationError> {
        self.calls.lock().unwrap().push(GeneratorCall {
            prompt: prompt.to_string(),
            references: reference_images.to_vec(),
            mutation: mutation.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        // Literal prompts carry no mutation text, so fall back to the prompt as the key.
        let key = if mutation.is_empty() { prompt } else { mutation };
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        match scripted.unwrap_or_else(|| self.default.clone()) {
            Ok(data) => Ok(data),
            Err(body) => Err(GenerationError::Api { status: 500, body }),
        }
    }
}

/// Enhancer whose results are keyed by the submitted base64 payload.
pub struct ScriptedEnhancer {
    scripts: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Option<Duration>,
}

impl ScriptedEnhancer {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn script(&self, image_base64: &str, results: Vec<Result<String, String>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(image_base64.to_string(), results.into());
    }

    /// `(image_base64, size)` per call.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for ScriptedEnhancer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Enhancer for ScriptedEnhancer {
    async fn enhance(
        &self,
        image_base64: &str,
        _prompt: &str,
        size: &str,
    ) -> Result<String, EnhanceError> {
        self.calls
            .lock()
            .unwrap()
            .push((image_base64.to_string(), size.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(image_base64)
            .and_then(VecDeque::pop_front);
        match scripted {
            Some(Ok(url)) => Ok(url),
            Some(Err(msg)) => Err(EnhanceError::ProcessingFailed(msg)),
            None => Err(EnhanceError::InvalidResponse("unscripted image".to_string())),
        }
    }
}

/// Reference source serving fixed bytes per URL.
#[derive(Default)]
pub struct StaticReferences {
    images: Mutex<HashMap<String, Vec<u8>>>,
    failures: Mutex<HashMap<String, u32>>,
}

impl StaticReferences {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, url: &str, bytes: Vec<u8>) {
        self.images.lock().unwrap().insert(url.to_string(), bytes);
    }

    /// The next `n` fetches of `url` fail.
    pub fn fail_times(&self, url: &str, n: u32) {
        self.failures.lock().unwrap().insert(url.to_string(), n);
    }

    fn take_failure(&self, url: &str) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(url) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl ReferenceSource for StaticReferences {
    async fn fetch_bytes(&self, reference: &str) -> Result<Vec<u8>, ReferenceError> {
        if self.take_failure(reference) {
            return Err(ReferenceError::Fetch("503 Service Unavailable".to_string()));
        }
        self.images
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| ReferenceError::Fetch(format!("404 Not Found: {}", reference)))
    }

    async fn to_base64(&self, reference: &str) -> Result<String, ReferenceError> {
        use base64::Engine;
        let bytes = self.fetch_bytes(reference).await?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Broker replaying canned feed pages in order.
pub struct FakeBroker {
    user_id: Result<String, String>,
    pages: Mutex<HashMap<&'static str, VecDeque<Value>>>,
    cursors: Mutex<Vec<Option<String>>>,
}

impl FakeBroker {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: Ok(user_id.to_string()),
            pages: Mutex::new(HashMap::new()),
            cursors: Mutex::new(Vec::new()),
        }
    }

    pub fn unknown_user() -> Self {
        Self {
            user_id: Err("{\"detail\":\"not found\"}".to_string()),
            pages: Mutex::new(HashMap::new()),
            cursors: Mutex::new(Vec::new()),
        }
    }

    pub fn with_pages(self, kind: FeedKind, pages: Vec<Value>) -> Self {
        self.pages.lock().unwrap().insert(kind.path(), pages.into());
        self
    }

    /// Cursors received by `feed_page`, in call order.
    pub fn cursors(&self) -> Vec<Option<String>> {
        self.cursors.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileBroker for FakeBroker {
    async fn user_id(&self, username: &str) -> Result<String, BrokerError> {
        self.user_id
            .clone()
            .map_err(|body| BrokerError::MissingUserId {
                username: username.to_string(),
                body,
            })
    }

    async fn feed_page(
        &self,
        kind: FeedKind,
        _user_id: &str,
        cursor: Option<&str>,
    ) -> Result<Value, BrokerError> {
        self.cursors
            .lock()
            .unwrap()
            .push(cursor.map(str::to_string));
        self.pages
            .lock()
            .unwrap()
            .get_mut(kind.path())
            .and_then(VecDeque::pop_front)
            .ok_or_else(|| BrokerError::Api {
                status: 500,
                body: "no more pages".to_string(),
            })
    }
}

/// Classifier that passes every URL in `passing` with a score derived from its position.
pub struct FakeClassifier {
    passing: Vec<String>,
}

impl FakeClassifier {
    pub fn passing(urls: &[&str]) -> Self {
        Self {
            passing: urls.iter().map(|u| u.to_string()).collect(),
        }
    }
}

#[async_trait]
impl FaceClassifier for FakeClassifier {
    async fn classify(
        &self,
        urls: &[String],
        on_progress: ProgressCallback<'_>,
    ) -> ClassificationOutcome {
        let all_results: Vec<FaceAnalysis> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| {
                let pass = self.passing.contains(url);
                let score = if pass { 10.0 - i as f64 * 0.5 } else { 2.0 };
                FaceAnalysis {
                    url: url.clone(),
                    zoom_score: score,
                    visibility_score: score,
                    total: score * 2.0,
                    decision: if pass { Decision::Yes } else { Decision::No },
                    explanation: String::new(),
                }
            })
            .collect();

        let passed = all_results.iter().filter(|r| r.passed()).count();
        if !urls.is_empty() {
            on_progress(BatchProgress {
                batch: 1,
                total_batches: 1,
                analyzed: urls.len(),
                passed,
            });
        }

        ClassificationOutcome {
            top_selections: top_selections(&all_results, 5),
            all_results,
        }
    }
}
