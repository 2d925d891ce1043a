//! A working [`ProfileStore`] adapter backed by two in-process `moka`
//! TTL caches — one for payload bytes, one for metadata rows. `moka` is
//! already part of the stack this crate grows from (it backs an in-process
//! TTL cache there too); reusing it here means the store's "one source of
//! truth for expiry" contract (spec §6) costs us nothing beyond a
//! [`moka::Expiry`] impl that reads the per-insert TTL back out.
//!
//! This is not the persistent on-disk engine spec §1 calls out as external —
//! it exists so the crate is runnable and its end-to-end properties (spec §8)
//! are testable without one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use moka::future::Cache;
use moka::Expiry;
use uuid::Uuid;

use crate::error::{CollectorError, Result};

use super::{Label, LabelFilter, Payload, ProfileMeta, ProfileStore};

struct TtlEntry<T> {
    value: T,
    ttl: Duration,
}

struct PerEntryExpiry;

impl<T: Send + Sync + 'static> Expiry<String, Arc<TtlEntry<T>>> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Arc<TtlEntry<T>>,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process, TTL-expiring [`ProfileStore`] implementation.
pub struct MokaStore {
    payloads: Cache<String, Arc<TtlEntry<Payload>>>,
    metas: Cache<String, Arc<TtlEntry<ProfileMeta>>>,
}

impl std::fmt::Debug for MokaStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaStore")
            .field("payloads", &self.payloads.entry_count())
            .field("metas", &self.metas.entry_count())
            .finish()
    }
}

impl Default for MokaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MokaStore {
    pub fn new() -> Self {
        Self {
            payloads: Cache::builder().expire_after(PerEntryExpiry).build(),
            metas: Cache::builder().expire_after(PerEntryExpiry).build(),
        }
    }

    fn meta_key(profile_id: &str, sample_type: &str) -> String {
        format!("{profile_id}#{sample_type}")
    }
}

#[async_trait]
impl ProfileStore for MokaStore {
    async fn save_payload(
        &self,
        display_name: &str,
        bytes: Vec<u8>,
        ttl: Duration,
    ) -> Result<String> {
        let profile_id = Uuid::now_v7().to_string();
        self.payloads
            .insert(
                profile_id.clone(),
                Arc::new(TtlEntry {
                    value: Payload {
                        display_name: display_name.to_string(),
                        bytes,
                    },
                    ttl,
                }),
            )
            .await;
        Ok(profile_id)
    }

    async fn get_payload(&self, profile_id: &str) -> Result<Payload> {
        self.payloads
            .get(profile_id)
            .await
            .map(|entry| entry.value.clone())
            .ok_or_else(|| CollectorError::ProfileNotFound(profile_id.to_string()))
    }

    async fn save_metas(&self, metas: Vec<ProfileMeta>, ttl: Duration) -> Result<()> {
        for meta in metas {
            let key = Self::meta_key(&meta.profile_id, &meta.sample_type);
            self.metas
                .insert(key, Arc::new(TtlEntry { value: meta, ttl }))
                .await;
        }
        Ok(())
    }

    async fn list_metas(
        &self,
        sample_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filters: &[LabelFilter],
    ) -> Result<Vec<ProfileMeta>> {
        let in_window: Vec<ProfileMeta> = self
            .metas
            .iter()
            .map(|(_, v)| v.value.clone())
            .filter(|m| m.sample_type == sample_type)
            .filter(|m| {
                let ts = Utc
                    .timestamp_millis_opt(m.timestamp_ms)
                    .single()
                    .unwrap_or(start);
                ts >= start && ts <= end
            })
            .collect();

        if filters.is_empty() {
            return Ok(in_window);
        }

        let mut candidates: Option<Vec<String>> = None;
        for filter in filters {
            let matching: Vec<String> = in_window
                .iter()
                .filter(|m| {
                    m.labels
                        .iter()
                        .any(|l| l.key == filter.key && l.value == filter.value)
                })
                .map(|m| m.profile_id.clone())
                .collect();
            candidates = Some(match candidates {
                None => matching,
                Some(running) => filter.apply(&running, &matching),
            });
        }
        let ids = candidates.unwrap_or_default();
        Ok(in_window
            .into_iter()
            .filter(|m| ids.contains(&m.profile_id))
            .collect())
    }

    async fn list_applications(&self) -> Result<Vec<String>> {
        let mut apps: Vec<String> = self
            .metas
            .iter()
            .map(|(_, v)| v.value.application.clone())
            .collect();
        apps.sort();
        apps.dedup();
        Ok(apps)
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let mut labels: Vec<Label> = self
            .metas
            .iter()
            .flat_map(|(_, v)| v.value.labels.clone())
            .collect();
        labels.sort_by(|a, b| (a.key.as_str(), a.value.as_str()).cmp(&(b.key.as_str(), b.value.as_str())));
        labels.dedup_by(|a, b| a.key == b.key && a.value == b.value);
        Ok(labels)
    }

    async fn list_sample_types(&self) -> Result<Vec<String>> {
        let mut types: Vec<String> = self
            .metas
            .iter()
            .map(|(_, v)| v.value.sample_type.clone())
            .collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    async fn close(&self) {
        self.payloads.invalidate_all();
        self.metas.invalidate_all();
    }
}
