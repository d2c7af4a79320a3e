//! Profile intake: broker pagination, shape normalization, dedup and face filtering, with
//! progress streamed as NDJSON events.

pub mod events;
pub mod pipeline;
pub mod posts;
pub mod reels;

pub use events::{
    AnalyzedPhoto, CollectedPhoto, CollectedReel, IntakeEvent, IntakeSummary, LogStatus,
};
pub use pipeline::IntakePipeline;
