//! Bronze layer: append-only audit trail
//!
//! Every remote attempt, successful or not, becomes exactly one immutable
//! bronze row. The selector then deterministically picks the authoritative
//! record per partition for silver derivation.

pub mod persister;
pub mod selector;
pub mod store;

pub use persister::{sanitize_params, AttemptContext, AuditPersister};
pub use selector::select_best;
pub use store::{BronzeStore, PgBronzeStore};
