//! Profile Parser Adapter (spec §4.1): decodes a pulled payload into a
//! normalized in-memory profile record, or fails with `InvalidProfile` /
//! `EmptySampleTypes`. Pure and stateless — no I/O, no shared state. Traces
//! bypass this module entirely and are persisted verbatim by the scrape
//! worker.

pub mod proto;

use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::{CollectorError, Result};

/// One (name, unit) pair describing a numeric column of samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleType {
    pub sample_type: String,
    pub unit: String,
}

/// A decoded profile payload, normalized enough for the collector to derive
/// per-sample-type metadata and to rewrite the display-owner field.
#[derive(Debug, Clone)]
pub struct NormalizedProfile {
    pub sample_types: Vec<SampleType>,
    /// One row per sample; each row's values align with `sample_types`.
    pub samples: Vec<Vec<i64>>,
    pub duration_nanos: i64,
    raw: proto::Profile,
}

impl NormalizedProfile {
    /// Sums column `i` across every sample row — the `value` field of the
    /// `ProfileMeta` derived for sample-type index `i` (spec §4.2).
    pub fn column_sum(&self, i: usize) -> i64 {
        self.samples.iter().filter_map(|row| row.get(i)).sum()
    }

    /// Rewrites the first mapping's `filename` to `owner` (typically the
    /// scrape job's name). This is what the downstream UI displays as the
    /// profile's owner; the pprof format has no first-class owner field, so
    /// the original source repurposes this one (spec §9). A no-op if the
    /// profile carries no mapping at all.
    pub fn set_mapping_owner(&mut self, owner: &str) {
        if self.raw.mapping.is_empty() {
            return;
        }
        if self.raw.string_table.is_empty() {
            self.raw.string_table.push(String::new());
        }
        let idx = self.raw.intern(owner);
        self.raw.mapping[0].filename = idx;
    }

    /// Re-serializes the (possibly mutated) profile back to wire bytes —
    /// the buffer the worker persists, not the originally fetched body.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.encode_bytes()
    }
}

/// Decodes a pulled payload for any profile type except `trace`. Transparently
/// gunzips a gzip-wrapped payload (the real wire behavior of `/debug/pprof/*`
/// endpoints); an already-uncompressed protobuf body is also accepted, since
/// some targets disable compression.
pub fn decode(bytes: &[u8]) -> Result<NormalizedProfile> {
    let decompressed = maybe_gunzip(bytes)?;

    let raw = proto::Profile::decode_bytes(&decompressed)
        .map_err(|e| CollectorError::InvalidProfile(e.to_string()))?;

    if raw.sample_type.is_empty() {
        return Err(CollectorError::EmptySampleTypes);
    }

    let sample_types = raw
        .sample_type
        .iter()
        .map(|vt| SampleType {
            sample_type: raw.string_at(vt.r#type).to_string(),
            unit: raw.string_at(vt.unit).to_string(),
        })
        .collect();
    let samples = raw.sample.iter().map(|s| s.value.clone()).collect();
    let duration_nanos = raw.duration_nanos;

    Ok(NormalizedProfile {
        sample_types,
        samples,
        duration_nanos,
        raw,
    })
}

fn maybe_gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
    if bytes.len() >= 2 && bytes[0..2] == GZIP_MAGIC {
        let mut out = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut out)
            .map_err(|e| CollectorError::InvalidProfile(format!("gzip decode failed: {e}")))?;
        Ok(out)
    } else {
        Ok(bytes.to_vec())
    }
}
