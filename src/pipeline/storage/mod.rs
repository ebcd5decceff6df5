//! Read access to the ingestion-event log.
//!
//! Connectors write one record per fetch attempt outcome. The resilience
//! layer only reads: the health probes and the summary report scan it.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryIngestionLog;
pub use sqlite::SqliteIngestionLog;

use crate::error::{IngestError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Success,
    Failed,
    Pending,
}

impl IngestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Success => "success",
            IngestionStatus::Failed => "failed",
            IngestionStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestionStatus {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(IngestionStatus::Success),
            "failed" => Ok(IngestionStatus::Failed),
            "pending" => Ok(IngestionStatus::Pending),
            other => Err(IngestError::InvalidRecord(format!(
                "unknown ingestion status '{}'",
                other
            ))),
        }
    }
}

/// One fetch outcome as stored by a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionRecord {
    pub id: String,
    pub source: String,
    pub source_url: String,
    pub status: IngestionStatus,
    pub ingested_at: DateTime<Utc>,
    pub hash: String,
}

impl IngestionRecord {
    /// Build a record with a fresh id and the SHA-256 of `payload` as hash.
    pub fn new(
        source: impl Into<String>,
        source_url: impl Into<String>,
        status: IngestionStatus,
        payload: &[u8],
        ingested_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            source_url: source_url.into(),
            status,
            ingested_at,
            hash: content_hash(payload),
        }
    }
}

pub fn content_hash(payload: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(payload);
    hex::encode(h.finalize())
}

/// Read side of the ingestion log.
#[async_trait]
pub trait IngestionLog: Send + Sync {
    /// Records with `ingested_at >= since`, oldest first.
    async fn records_since(&self, since: DateTime<Utc>) -> Result<Vec<IngestionRecord>>;

    /// Every record, oldest first.
    async fn all_records(&self) -> Result<Vec<IngestionRecord>>;

    /// Timestamp of the newest successful record for each source.
    async fn latest_success_by_source(&self) -> Result<BTreeMap<String, DateTime<Utc>>> {
        let mut latest: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for r in self.all_records().await? {
            if r.status != IngestionStatus::Success {
                continue;
            }
            latest
                .entry(r.source)
                .and_modify(|ts| *ts = (*ts).max(r.ingested_at))
                .or_insert(r.ingested_at);
        }
        Ok(latest)
    }
}
