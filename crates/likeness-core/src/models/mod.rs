//! Data models for the application
//!
//! Identity rows and their batch requests, media library items, mutation descriptors and
//! usage log entries.

mod identity;
mod media_item;
mod mutation;
mod usage;

pub use identity::*;
pub use media_item::*;
pub use mutation::*;
pub use usage::*;
