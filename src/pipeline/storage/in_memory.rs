use super::{IngestionLog, IngestionRecord};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// In-memory ingestion log for development/testing
#[derive(Clone, Default)]
pub struct InMemoryIngestionLog {
    records: Arc<Mutex<Vec<IngestionRecord>>>,
}

impl InMemoryIngestionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = IngestionRecord>) -> Self {
        let log = Self::new();
        for r in records {
            log.push(r);
        }
        log
    }

    pub fn push(&self, record: IngestionRecord) {
        debug!(source = %record.source, status = %record.status, "appending ingestion record");
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(record);
    }

    fn snapshot(&self) -> Vec<IngestionRecord> {
        let mut records = self
            .records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        records.sort_by_key(|r| r.ingested_at);
        records
    }
}

#[async_trait]
impl IngestionLog for InMemoryIngestionLog {
    async fn records_since(&self, since: DateTime<Utc>) -> Result<Vec<IngestionRecord>> {
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|r| r.ingested_at >= since)
            .collect())
    }

    async fn all_records(&self) -> Result<Vec<IngestionRecord>> {
        Ok(self.snapshot())
    }
}
