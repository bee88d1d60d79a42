//! API and file adapters. Each one turns a source into an ordered `Vec<Note>`.

pub mod blogger;
pub mod hashnode;
pub mod wikipedia;
pub mod wordpress;
pub mod wxr;

use chrono::{DateTime, NaiveDateTime, Utc};

/// RFC 3339 timestamp, or a zone-less `YYYY-MM-DDThh:mm:ss` read as UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_zoned_and_naive_timestamps() {
        let zoned = parse_timestamp("2021-03-04T05:06:07+02:00").unwrap();
        assert_eq!(zoned.to_rfc3339(), "2021-03-04T03:06:07+00:00");
        let naive = parse_timestamp("2021-03-04T05:06:07").unwrap();
        assert_eq!(naive.to_rfc3339(), "2021-03-04T05:06:07+00:00");
        let spaced = parse_timestamp("2021-03-04 05:06:07").unwrap();
        assert_eq!(spaced, naive);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
