//! Repository trait implementations.

mod access_log;
mod associations;
mod daemon_records;
mod project_settings;
mod tasks;

pub use access_log::{RetentionPolicy, SqliteAccessLog};
pub use associations::SqliteAssociationRepository;
pub use daemon_records::SqliteDaemonRecords;
pub use project_settings::SqliteProjectSettings;
pub use tasks::SqliteTaskDirectory;

use crate::error::{SqliteError, SqliteResult};
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::{Path, PathBuf};

/// Fixed-width RFC 3339 so text order matches time order.
pub(crate) fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_ts(raw: &str) -> SqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SqliteError::Decode(format!("timestamp '{}': {}", raw, e)))
}

pub(crate) fn encode_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub(crate) fn decode_path(raw: String) -> PathBuf {
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encoded_timestamps_sort_like_times() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(5);
        let c = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let mut encoded = vec![encode_ts(&c), encode_ts(&a), encode_ts(&b)];
        encoded.sort();
        assert_eq!(encoded, vec![encode_ts(&a), encode_ts(&b), encode_ts(&c)]);
        assert_eq!(decode_ts(&encode_ts(&b)).unwrap(), b);
    }
}
