//! Payload normalization
//!
//! A normalizer is a pure mapping from one raw report payload to typed
//! silver rows. It performs no I/O and never fails the batch: entries it
//! cannot parse are dropped (with a warn log from the implementation) and
//! the valid remainder is still emitted. Partial success is the contract.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::pipeline::types::{PartitionKey, SilverRecord};

/// Provenance stamped onto every normalized row
#[derive(Debug, Clone)]
pub struct NormalizeMeta {
    pub partition: PartitionKey,
    /// Bronze record the payload came from
    pub request_uuid: Uuid,
    /// Receive time of that bronze record; drives upsert ordering
    pub response_dttm: DateTime<Utc>,
}

impl NormalizeMeta {
    /// Build a silver row carrying this provenance
    pub fn row(&self, natural_key: impl Into<String>, fields: serde_json::Value) -> SilverRecord {
        SilverRecord {
            tenant_id: self.partition.tenant_id,
            business_dttm: self.partition.business_dttm,
            natural_key: natural_key.into(),
            request_uuid: self.request_uuid,
            response_dttm: self.response_dttm,
            fields,
        }
    }
}

/// Pure payload-to-rows mapping, implemented once per target
///
/// Implementations should deserialize into their own typed row structs
/// (with a raw fallback variant for unknown shapes) and emit rows via
/// [`NormalizeMeta::row`] so provenance is never forgotten.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, payload: &str, meta: &NormalizeMeta) -> Vec<SilverRecord>;
}
