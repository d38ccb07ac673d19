//! Silver layer: typed, deduplicated business records
//!
//! Derived deterministically from the authoritative bronze record through a
//! per-target normalizer, then reconciled into the store with a
//! source-time-ordered idempotent upsert.

pub mod normalize;
pub mod store;

pub use normalize::{NormalizeMeta, Normalizer};
pub use store::{PgSilverStore, SilverStore};
