use super::{IngestionLog, IngestionRecord, IngestionStatus};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS ingestion_records (
        id           TEXT PRIMARY KEY,
        source       TEXT NOT NULL,
        source_url   TEXT NOT NULL,
        status       TEXT NOT NULL,
        ingested_at  INTEGER NOT NULL,
        hash         TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_ingestion_records_ingested_at
        ON ingestion_records (ingested_at);
    CREATE INDEX IF NOT EXISTS idx_ingestion_records_source_status
        ON ingestion_records (source, status);
"#;

const SELECT_COLUMNS: &str = "SELECT id, source, source_url, status, ingested_at, hash FROM ingestion_records";

type RawRow = (String, String, String, String, i64, String);

/// SQLite-backed ingestion log. Timestamps are stored as unix microseconds.
pub struct SqliteIngestionLog {
    conn: Mutex<Connection>,
}

impl SqliteIngestionLog {
    /// Open `<data_root>/ingest_log/ingestion.db`, creating it if needed.
    pub fn open_at_root<P: AsRef<Path>>(data_root: P) -> Result<Self> {
        let db_path = data_root.as_ref().join("ingest_log").join("ingestion.db");
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Write side, for connectors and fixtures. The health layer never calls it.
    pub fn append(&self, record: &IngestionRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO ingestion_records (id, source, source_url, status, ingested_at, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.source,
                record.source_url,
                record.status.as_str(),
                record.ingested_at.timestamp_micros(),
                record.hash,
            ],
        )?;
        Ok(())
    }

    fn query(&self, sql: &str, since_micros: Option<i64>) -> Result<Vec<IngestionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<RawRow> {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        };
        let rows = match since_micros {
            Some(since) => stmt
                .query_map(params![since], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        rows.into_iter().map(to_record).collect()
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| IngestError::InvalidRecord(format!("timestamp out of range: {}", micros)))
}

fn to_record(raw: RawRow) -> Result<IngestionRecord> {
    let (id, source, source_url, status, ingested_at, hash) = raw;
    Ok(IngestionRecord {
        status: status.parse::<IngestionStatus>()?,
        ingested_at: from_micros(ingested_at)?,
        id,
        source,
        source_url,
        hash,
    })
}

#[async_trait]
impl IngestionLog for SqliteIngestionLog {
    async fn records_since(&self, since: DateTime<Utc>) -> Result<Vec<IngestionRecord>> {
        let sql = format!("{} WHERE ingested_at >= ?1 ORDER BY ingested_at ASC", SELECT_COLUMNS);
        self.query(&sql, Some(since.timestamp_micros()))
    }

    async fn all_records(&self) -> Result<Vec<IngestionRecord>> {
        let sql = format!("{} ORDER BY ingested_at ASC", SELECT_COLUMNS);
        self.query(&sql, None)
    }

    async fn latest_success_by_source(&self) -> Result<BTreeMap<String, DateTime<Utc>>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT source, MAX(ingested_at) FROM ingestion_records
             WHERE status = 'success' GROUP BY source",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter()
            .map(|(source, micros)| Ok((source, from_micros(micros)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::tempdir;

    fn record(source: &str, status: IngestionStatus, at: DateTime<Utc>) -> IngestionRecord {
        IngestionRecord::new(source, format!("https://{}.example", source), status, b"{}", at)
    }

    #[tokio::test]
    async fn test_append_and_query_window() {
        let log = SqliteIngestionLog::open_in_memory().unwrap();
        let now = Utc::now();
        log.append(&record("serper", IngestionStatus::Success, now - Duration::hours(30)))
            .unwrap();
        log.append(&record("serper", IngestionStatus::Failed, now - Duration::hours(2)))
            .unwrap();
        log.append(&record("open_street_map", IngestionStatus::Pending, now))
            .unwrap();

        let all = log.all_records().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].ingested_at <= w[1].ingested_at));

        let recent = log.records_since(now - Duration::hours(24)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].status, IngestionStatus::Failed);
    }

    #[tokio::test]
    async fn test_latest_success_per_source() {
        let log = SqliteIngestionLog::open_in_memory().unwrap();
        let now = Utc::now();
        let newest = now - Duration::hours(1);
        log.append(&record("serper", IngestionStatus::Success, now - Duration::hours(5)))
            .unwrap();
        log.append(&record("serper", IngestionStatus::Success, newest))
            .unwrap();
        log.append(&record("serper", IngestionStatus::Failed, now)).unwrap();
        log.append(&record("google_places", IngestionStatus::Failed, now))
            .unwrap();

        let latest = log.latest_success_by_source().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(
            latest["serper"].timestamp_micros(),
            newest.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_persists_under_data_root() {
        let dir = tempdir().unwrap();
        let r = record("sport_scotland", IngestionStatus::Success, Utc::now());
        {
            let log = SqliteIngestionLog::open_at_root(dir.path()).unwrap();
            log.append(&r).unwrap();
        }
        assert!(dir.path().join("ingest_log").join("ingestion.db").exists());

        let reopened = SqliteIngestionLog::open_at_root(dir.path()).unwrap();
        let all = reopened.all_records().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, r.id);
        assert_eq!(all[0].hash, r.hash);
    }
}
