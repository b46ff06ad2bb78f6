use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use neubot_core::errors::ApplicationError;

pub mod memory;
pub mod quota;

pub use memory::InMemoryQuotaStore;
pub use quota::SqlQuotaStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        ApplicationError::Persistence(error.to_string())
    }
}

/// Fixed-width UTC rendering so stored timestamps order lexicographically.
pub(crate) fn encode_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("timestamp `{raw}`: {error}")))
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{decode_timestamp, encode_timestamp};

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).single().expect("date");
        let later = earlier + Duration::milliseconds(1);

        assert!(encode_timestamp(earlier) < encode_timestamp(later));
        assert_eq!(decode_timestamp(&encode_timestamp(later)).expect("decode"), later);
    }
}
