// Ingestion resilience: admission and retry, the ingestion log, and source health

pub mod health;
pub mod ingestion;
pub mod storage;
