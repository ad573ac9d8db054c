//! Billing period handling.
//!
//! A billing period is one calendar month, written `YYYY-MM`. Export object
//! keys carry it in a `BILLING_PERIOD=YYYY-MM` path segment, optionally
//! followed by a version token segment.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

static BILLING_PERIOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"BILLING_PERIOD=(\d{4})-(\d{2})").expect("billing period regex is valid")
});

static VERSION_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"BILLING_PERIOD=\d{4}-\d{2}/([^/]+)/").expect("version token regex is valid")
});

/// One calendar month of billing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(Self { year, month })
        } else {
            None
        }
    }

    /// Parse a `YYYY-MM` string.
    pub fn parse(s: &str) -> Option<Self> {
        let (year, month) = s.split_once('-')?;
        if year.len() != 4 || month.len() != 2 {
            return None;
        }
        Self::new(year.parse().ok()?, month.parse().ok()?)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The adjacent earlier month.
    pub fn previous(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn days_in_month(&self) -> u32 {
        let next = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1);
        match (first, next) {
            (Some(a), Some(b)) => (b - a).num_days() as u32,
            _ => 30,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Extract the billing period from an object key, if the key carries one.
pub fn extract_billing_period(object_key: &str) -> Option<BillingPeriod> {
    let captures = BILLING_PERIOD_RE.captures(object_key)?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    BillingPeriod::new(year, month)
}

/// Extract the version token: the path segment immediately after the
/// `BILLING_PERIOD=YYYY-MM/` segment, up to the next `/`.
pub fn extract_version_token(object_key: &str) -> Option<String> {
    VERSION_TOKEN_RE
        .captures(object_key)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let period = BillingPeriod::parse("2026-08").expect("should parse");
        assert_eq!(period.year(), 2026);
        assert_eq!(period.month(), 8);
        assert_eq!(period.to_string(), "2026-08");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(BillingPeriod::parse("2026-13").is_none());
        assert!(BillingPeriod::parse("2026-00").is_none());
        assert!(BillingPeriod::parse("2026-8").is_none());
        assert!(BillingPeriod::parse("garbage").is_none());
    }

    #[test]
    fn test_previous_wraps_january() {
        let january = BillingPeriod::parse("2026-01").expect("should parse");
        assert_eq!(january.previous().to_string(), "2025-12");

        let august = BillingPeriod::parse("2026-08").expect("should parse");
        assert_eq!(august.previous().to_string(), "2026-07");
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(
            BillingPeriod::parse("2026-09").expect("parse").days_in_month(),
            30
        );
        assert_eq!(
            BillingPeriod::parse("2026-02").expect("parse").days_in_month(),
            28
        );
        // Leap year
        assert_eq!(
            BillingPeriod::parse("2028-02").expect("parse").days_in_month(),
            29
        );
        assert_eq!(
            BillingPeriod::parse("2026-12").expect("parse").days_in_month(),
            31
        );
    }

    #[test]
    fn test_extract_billing_period() {
        let key = "reports/daily/BILLING_PERIOD=2026-08/data-001.csv.gz";
        let period = extract_billing_period(key).expect("should extract");
        assert_eq!(period.to_string(), "2026-08");

        assert!(extract_billing_period("reports/daily/data-001.csv.gz").is_none());
    }

    #[test]
    fn test_extract_version_token() {
        let key = "reports/BILLING_PERIOD=2026-08/20260815T010203Z-a1b2/data-001.csv.gz";
        assert_eq!(
            extract_version_token(key).as_deref(),
            Some("20260815T010203Z-a1b2")
        );

        // A file directly under the period segment carries no token.
        let flat = "reports/BILLING_PERIOD=2026-08/data-001.csv.gz";
        assert!(extract_version_token(flat).is_none());
    }

    #[test]
    fn test_contains() {
        let period = BillingPeriod::parse("2026-08").expect("parse");
        let inside = NaiveDate::from_ymd_opt(2026, 8, 15).expect("valid date");
        let outside = NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date");
        assert!(period.contains(inside));
        assert!(!period.contains(outside));
    }
}
