//! HTTP handlers, grouped by route family.

pub mod generation;
pub mod health;
pub mod identities;
pub mod intake;
pub mod media;
pub mod progress;
pub mod proxy;
pub mod seedream;
