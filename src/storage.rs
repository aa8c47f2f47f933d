//! Decoding of Helm v3 release records.
//!
//! Helm keeps one Secret (or ConfigMap) per release revision. The `release`
//! data key holds base64 text wrapping either a gzip stream or plain JSON.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::io::{Read, Write};
use thiserror::Error;

use crate::types::Release;

/// Label selector matching every object written by the Helm storage drivers.
pub const HELM_OWNER_SELECTOR: &str = "owner=helm";

/// Data key holding the encoded release.
pub const RELEASE_DATA_KEY: &str = "release";

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("release record has no `{RELEASE_DATA_KEY}` payload")]
    MissingPayload,
    #[error("invalid base64 in release payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decompress release payload: {0}")]
    Gzip(#[from] std::io::Error),
    #[error("invalid release JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct StoredRelease {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    version: i64,
    #[serde(default)]
    info: Option<StoredInfo>,
    #[serde(default)]
    chart: Option<StoredChart>,
}

#[derive(Debug, Deserialize)]
struct StoredInfo {
    #[serde(default)]
    status: String,
    #[serde(default, deserialize_with = "lenient_time")]
    last_deployed: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct StoredChart {
    #[serde(default)]
    metadata: Option<StoredChartMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct StoredChartMetadata {
    #[serde(default)]
    name: String,
    #[serde(default)]
    version: String,
    #[serde(default, rename = "appVersion")]
    app_version: String,
}

// Helm writes "" for unset times; treat anything unparseable as absent.
fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc)))
}

/// Decode the contents of a record's `release` key.
pub fn decode_release(payload: &[u8]) -> Result<Release, DecodeError> {
    let trimmed = payload.trim_ascii();
    if trimmed.is_empty() {
        return Err(DecodeError::MissingPayload);
    }
    let raw = STANDARD.decode(trimmed)?;

    let json = if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::with_capacity(raw.len() * 4);
        GzDecoder::new(raw.as_slice()).read_to_end(&mut out)?;
        out
    } else {
        raw
    };

    let stored: StoredRelease = serde_json::from_slice(&json)?;
    let metadata = stored.chart
        .and_then(|c| c.metadata)
        .unwrap_or_default();
    let (status, last_deployed) = match stored.info {
        Some(info) => (info.status, info.last_deployed),
        None => (String::new(), None),
    };

    Ok(Release {
        chart: metadata.name,
        name: stored.name,
        version: metadata.version,
        app_version: metadata.app_version,
        status,
        namespace: stored.namespace,
        revision: stored.version,
        last_deployed_millis: last_deployed.map(|t| t.timestamp_millis()).unwrap_or(0),
        latest_version: String::new(),
    })
}

/// Encode release JSON the way Helm's storage drivers do (gzip, then base64).
pub fn encode_payload(json: &[u8]) -> std::io::Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json)?;
    Ok(STANDARD.encode(encoder.finish()?))
}

/// Keep only the highest revision of each release, like `helm list`.
pub fn latest_revisions(releases: Vec<Release>) -> Vec<Release> {
    let mut latest: HashMap<(String, String), Release> = HashMap::new();
    for release in releases {
        let key = (release.namespace.clone(), release.name.clone());
        match latest.get(&key) {
            Some(existing) if existing.revision >= release.revision => {}
            _ => {
                latest.insert(key, release);
            }
        }
    }
    let mut out: Vec<Release> = latest.into_values().collect();
    out.sort_by(|a, b| a.name.cmp(&b.name));
    out
}
