//! Pipeline constants shared by services, handlers and the progress reconciler.

/// Records created per anchor batch.
pub const ANCHOR_BATCH_SIZE: usize = 10;
/// Records created per variant batch.
pub const VARIANT_BATCH_SIZE: usize = 5;
/// Anchor records per mutation: records 0..5 use mutation 0, 5..10 use mutation 1.
pub const ANCHOR_RECORDS_PER_MUTATION: usize = 5;

/// Image generation: 3 attempts, 5s initial delay.
pub const GENERATION_MAX_ATTEMPTS: u32 = 3;
pub const GENERATION_INITIAL_DELAY_MS: u64 = 5_000;

/// Reference image to base64 conversion: 5 attempts, 2s initial delay.
pub const BASE64_MAX_ATTEMPTS: u32 = 5;
pub const BASE64_INITIAL_DELAY_MS: u64 = 2_000;

/// Record update after a successful generation: 5 attempts, 1s linear step.
pub const DB_UPDATE_MAX_ATTEMPTS: u32 = 5;
pub const DB_UPDATE_STEP_MS: u64 = 1_000;

/// Seedream output height; width follows the source aspect ratio.
pub const SEEDREAM_TARGET_HEIGHT: u32 = 3840;
pub const SEEDREAM_FALLBACK_WIDTH: u32 = 3072;

/// Face classifier images per model call.
pub const CLASSIFIER_BATCH_SIZE: usize = 10;
pub const CLASSIFIER_FETCH_TIMEOUT_SECS: u64 = 15;
/// Number of best passing photos returned as `topSelections`.
pub const CLASSIFIER_TOP_SELECTIONS: usize = 5;

/// Broker pagination parameters.
pub const BROKER_DEPTH: u32 = 1;
pub const BROKER_CHUNK_SIZE: u32 = 12;

/// Enhancement API polling.
pub const ENHANCER_TIMEOUT_SECS: u64 = 120;
pub const ENHANCER_POLL_INTERVAL_SECS: u64 = 5;
pub const ENHANCER_MAX_POLL_ATTEMPTS: u32 = 60;

/// Browser identity used for direct image and video fetches.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
pub const INSTAGRAM_REFERER: &str = "https://www.instagram.com/";

/// Postgres NOTIFY channel carrying identity row changes.
pub const IDENTITY_CHANGES_CHANNEL: &str = "identity_changes";

/// Group key for identities without a username. Never reconciled.
pub const UNCATEGORIZED_GROUP: &str = "uncategorized";
