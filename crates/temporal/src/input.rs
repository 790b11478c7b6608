//! Parsing caller-supplied timestamps for the `as_of`/`diff`/`changes`
//! query surface. A malformed timestamp is an input-validation failure,
//! not a storage fault (spec.md section 4.7) — it never touches the
//! recovery machinery.

use entitydb_core::{Error, Result, Timestamp};

/// Parse a decimal nanoseconds-since-epoch string into a `Timestamp`.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp> {
    raw.trim()
        .parse::<u64>()
        .map(Timestamp::from_nanos)
        .map_err(|_| Error::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_nanosecond_strings() {
        assert_eq!(parse_timestamp("12345").unwrap(), Timestamp::from_nanos(12345));
        assert_eq!(parse_timestamp(" 0 ").unwrap(), Timestamp::EPOCH);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_timestamp("not-a-time"), Err(Error::InvalidTimestamp(_))));
        assert!(matches!(parse_timestamp("-5"), Err(Error::InvalidTimestamp(_))));
        assert!(matches!(parse_timestamp(""), Err(Error::InvalidTimestamp(_))));
    }
}
