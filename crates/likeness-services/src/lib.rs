//! Likeness Services Layer
//!
//! Business orchestration on top of the store traits and outbound clients: the retry
//! executor, batch generation, the seedream stage, profile intake and progress reconciliation.
//! HTTP handling stays in likeness-api.

pub mod generation;
pub mod intake;
pub mod orchestrator;
pub mod progress;
pub mod retry;
pub mod seedream_stage;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use generation::GenerationService;
pub use intake::{IntakeEvent, IntakePipeline};
pub use orchestrator::{BatchJob, BatchOrchestrator, BatchOutcome};
pub use progress::{reconcile, GroupProgress, GroupState, ProgressReconciler};
pub use retry::RetryPolicy;
pub use seedream_stage::SeedreamStage;
