//! Likeness Database Layer
//!
//! Postgres repositories for identities, media items and usage logs, the store traits the
//! services are written against, and the LISTEN/NOTIFY change feed.

pub mod db;
pub mod store_traits;

pub use db::change_feed::spawn_identity_listener;
pub use db::transaction::TransactionGuard;
pub use db::{
    ClaimOutcome, ConflictRule, DeleteOutcome, IdentityRepository, MediaItemRepository,
    UsageLogRepository,
};
pub use store_traits::{IdentityStore, MediaItemStore, UsageSink};
