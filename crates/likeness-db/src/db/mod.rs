//! Database repositories for the data access layer
//!
//! One repository per table, plus transaction utilities and the identity change feed.

pub mod change_feed;
pub mod identity;
pub mod media_item;
pub mod transaction;
pub mod usage_log;

pub use identity::{ClaimOutcome, ConflictRule, DeleteOutcome, IdentityRepository};
pub use media_item::MediaItemRepository;
pub use usage_log::UsageLogRepository;
