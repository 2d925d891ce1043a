//! Store Façade (spec §4.6 / §6): the boundary the collector writes through
//! and the API plane reads through. Out of the core's algorithmic scope —
//! this module defines the trait contract plus one working adapter
//! ([`moka_store::MokaStore`]) so the crate is runnable and testable without
//! a persistent on-disk engine (explicitly out of scope; see SPEC_FULL.md).

pub mod label_filter;
pub mod moka_store;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use label_filter::{Condition, LabelFilter};

/// A single free-form key/value label attached to a target or a profile meta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub key: String,
    pub value: String,
}

/// One row per (stored payload, sample-type index) — spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileMeta {
    pub profile_id: String,
    pub timestamp_ms: i64,
    /// Absent for traces.
    pub duration_ns: Option<i64>,
    pub sample_type: String,
    pub sample_type_unit: Option<String>,
    pub profile_type: String,
    pub job: String,
    pub host: String,
    pub application: String,
    pub labels: Vec<Label>,
    /// Absent for traces.
    pub value: Option<i64>,
}

/// The payload itself: a display name plus the raw (re-serialized, for
/// non-trace types) bytes fetched from the target.
#[derive(Debug, Clone)]
pub struct Payload {
    pub display_name: String,
    pub bytes: Vec<u8>,
}

/// Consumed interface the collector writes through and the API plane reads
/// through (spec §6). All writes carry the job's TTL; the store alone is
/// responsible for expiry — the collector never deletes anything itself.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn save_payload(&self, display_name: &str, bytes: Vec<u8>, ttl: Duration)
        -> Result<String>;

    async fn get_payload(&self, profile_id: &str) -> Result<Payload>;

    async fn save_metas(&self, metas: Vec<ProfileMeta>, ttl: Duration) -> Result<()>;

    async fn list_metas(
        &self,
        sample_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &[LabelFilter],
    ) -> Result<Vec<ProfileMeta>>;

    async fn list_applications(&self) -> Result<Vec<String>>;

    async fn list_labels(&self) -> Result<Vec<Label>>;

    async fn list_sample_types(&self) -> Result<Vec<String>>;

    async fn close(&self);
}
