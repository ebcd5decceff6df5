/// Source name constants to ensure consistency across the codebase.
/// These are the keys used in `config/sources.toml` and in the ingestion log.
pub const SERPER: &str = "serper";
pub const GOOGLE_PLACES: &str = "google_places";
pub const OPEN_STREET_MAP: &str = "open_street_map";
pub const SPORT_SCOTLAND: &str = "sport_scotland";
pub const EDINBURGH_COUNCIL: &str = "edinburgh_council";
pub const OPEN_CHARGE_MAP: &str = "open_charge_map";

/// Get all source names the default configuration knows about
pub fn get_known_sources() -> Vec<&'static str> {
    vec![
        SERPER,
        GOOGLE_PLACES,
        OPEN_STREET_MAP,
        SPORT_SCOTLAND,
        EDINBURGH_COUNCIL,
        OPEN_CHARGE_MAP,
    ]
}

// Retry defaults applied to sources missing from the configuration
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_SECS: f64 = 1.0;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_DELAY_SECS: f64 = 60.0;

// Health probe defaults
pub const DEFAULT_FAILURE_WINDOW_HOURS: i64 = 24;
pub const DEFAULT_FAILURE_WARNING_PERCENT: f64 = 10.0;
pub const DEFAULT_FAILURE_CRITICAL_PERCENT: f64 = 25.0;
pub const DEFAULT_STALE_THRESHOLD_HOURS: i64 = 24;
pub const DEFAULT_QUOTA_WARNING_PER_HOUR: usize = 50;
pub const DEFAULT_QUOTA_CRITICAL_PER_HOUR: usize = 80;
pub const DEFAULT_QUOTA_WARNING_PER_DAY: usize = 500;
pub const DEFAULT_QUOTA_CRITICAL_PER_DAY: usize = 800;

/// Failing records returned for drill-down by the failure probe and report
pub const RECENT_FAILURES_LIMIT: usize = 10;

// Environment variables
pub const CONFIG_PATH_ENV: &str = "VENUE_INGEST_CONFIG";
pub const DATA_ROOT_ENV: &str = "VENUE_INGEST_DATA_ROOT";

pub const DEFAULT_CONFIG_PATH: &str = "config/sources.toml";
pub const DEFAULT_DATA_ROOT: &str = "data";
