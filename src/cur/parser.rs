//! Tolerant parser for billing export CSV lines.
//!
//! The export format is RFC4180-style CSV whose column set drifts across
//! export revisions, so columns are resolved by header name rather than
//! fixed offset. Malformed rows are dropped, never raised: short rows,
//! unparseable dates, and non-numeric costs all normalize to "skip".

use std::collections::HashMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::columns;

static LEADING_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})").expect("date regex is valid"));

/// File-level parse failures. Row-level problems never surface as errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("File is empty")]
    EmptyFile,

    #[error("Required columns not found: {0}")]
    MissingColumns(String),

    #[error("No service name column found (product, product_servicecode or line_item_product_code)")]
    NoServiceColumn,
}

/// Split one CSV line. A quote toggles "inside quotes"; a doubled quote
/// inside a quoted field is a literal quote.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                result.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    result.push(current);
    result
}

/// Remove one leading and one trailing double quote, if present.
fn strip_quotes(value: &str) -> &str {
    let value = value.strip_prefix('"').unwrap_or(value);
    value.strip_suffix('"').unwrap_or(value)
}

/// Parse a cost cell. Empty, `"0"`, `"0.0"`, and anything non-numeric all
/// normalize to zero.
pub fn parse_cost(value: &str) -> f64 {
    if value.trim().is_empty() {
        return 0.0;
    }

    let cleaned = strip_quotes(value).trim();
    if cleaned.is_empty() || cleaned == "0" || cleaned == "0.0" {
        return 0.0;
    }

    cleaned.parse().unwrap_or(0.0)
}

/// Result of probing the JSON-valued `product` column for a service name.
///
/// The column's value frequently fails to parse (truncated JSON, plain
/// strings, empty objects); that is an expected outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceNameProbe {
    Found(String),
    NotFound,
}

/// Extract `product_name` (or `servicename`) from the JSON-valued product
/// column.
pub fn probe_product_service_name(raw: &str) -> ServiceNameProbe {
    if raw.trim().is_empty() {
        return ServiceNameProbe::NotFound;
    }

    // Inner quotes arrive doubled from the CSV quoting layer.
    let cleaned = strip_quotes(raw).trim().replace("\"\"", "\"");
    if cleaned.is_empty() || cleaned == "{}" || !cleaned.starts_with('{') {
        return ServiceNameProbe::NotFound;
    }

    let Ok(value) = serde_json::from_str::<serde_json::Value>(&cleaned) else {
        return ServiceNameProbe::NotFound;
    };

    let name = value
        .get("product_name")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            value
                .get("servicename")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
        });

    match name {
        Some(name) => ServiceNameProbe::Found(name.to_string()),
        None => ServiceNameProbe::NotFound,
    }
}

/// Normalize a usage date cell to a calendar date.
///
/// Accepts plain `YYYY-MM-DD`, ISO timestamps (time part dropped after
/// conversion to UTC), and strings with a leading date substring.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = strip_quotes(raw).trim();
    if cleaned.is_empty() {
        return None;
    }

    if cleaned.len() == 10
        && let Ok(date) = NaiveDate::parse_from_str(cleaned, "%Y-%m-%d")
    {
        return Some(date);
    }

    if cleaned.contains('T')
        && let Ok(ts) = chrono::DateTime::parse_from_rfc3339(cleaned)
    {
        return Some(ts.with_timezone(&chrono::Utc).date_naive());
    }

    let captures = LEADING_DATE_RE.captures(cleaned)?;
    let year = captures.get(1)?.as_str().parse().ok()?;
    let month = captures.get(2)?.as_str().parse().ok()?;
    let day = captures.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Column positions resolved from one file's header line.
#[derive(Debug, Clone)]
pub struct ColumnLayout {
    pub usage_start_date: usize,
    pub unblended_cost: usize,
    pub currency: usize,
    pub net_unblended_cost: Option<usize>,
    pub product: Option<usize>,
    pub service_code: Option<usize>,
    pub product_code: Option<usize>,
}

impl ColumnLayout {
    /// Resolve column positions by header name.
    pub fn from_header(header_line: &str) -> Result<Self, ParseError> {
        let headers = split_csv_line(header_line);
        let index: HashMap<&str, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (strip_quotes(h), i))
            .collect();

        let usage_start_date = index.get(columns::USAGE_START_DATE).copied();
        let unblended_cost = index.get(columns::UNBLENDED_COST).copied();
        let currency = index.get(columns::CURRENCY_CODE).copied();

        let (Some(usage_start_date), Some(unblended_cost), Some(currency)) =
            (usage_start_date, unblended_cost, currency)
        else {
            let mut missing = Vec::new();
            if usage_start_date.is_none() {
                missing.push(columns::USAGE_START_DATE);
            }
            if unblended_cost.is_none() {
                missing.push(columns::UNBLENDED_COST);
            }
            if currency.is_none() {
                missing.push(columns::CURRENCY_CODE);
            }
            return Err(ParseError::MissingColumns(missing.join(", ")));
        };

        let product = index.get(columns::PRODUCT).copied();
        let service_code = index.get(columns::PRODUCT_SERVICECODE).copied();
        let product_code = index.get(columns::PRODUCT_CODE).copied();

        if product.is_none() && service_code.is_none() && product_code.is_none() {
            return Err(ParseError::NoServiceColumn);
        }

        Ok(Self {
            usage_start_date,
            unblended_cost,
            currency,
            net_unblended_cost: index.get(columns::NET_UNBLENDED_COST).copied(),
            product,
            service_code,
            product_code,
        })
    }

    /// Highest column index a row must reach to be considered at all. The
    /// currency column is deliberately not included.
    fn required_width(&self) -> usize {
        let mut max = self.usage_start_date.max(self.unblended_cost);
        for idx in [
            self.net_unblended_cost,
            self.product,
            self.service_code,
            self.product_code,
        ]
        .into_iter()
        .flatten()
        {
            max = max.max(idx);
        }
        max
    }
}

/// One admitted data row.
#[derive(Debug, Clone, PartialEq)]
pub struct BillingRecord {
    pub service_name: String,
    pub cost: f64,
    pub usage_date: NaiveDate,
}

/// Outcome of parsing one data line.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    /// Currency cell, when the row carries a non-empty one. Captured even
    /// for rows that are not admitted.
    pub currency: Option<String>,
    /// Present only when the row clears admission: positive cost and a
    /// parseable usage date.
    pub record: Option<BillingRecord>,
}

/// Parse one data line against the resolved layout. Returns None for rows
/// too short to reach the required columns.
pub fn parse_row(line: &str, layout: &ColumnLayout) -> Option<ParsedRow> {
    let values = split_csv_line(line);

    if values.len() <= layout.required_width() {
        return None;
    }

    let currency = values
        .get(layout.currency)
        .map(|v| strip_quotes(v).trim().to_string())
        .filter(|v| !v.is_empty());

    let cost = resolve_cost(&values, layout);
    if cost <= 0.0 {
        return Some(ParsedRow {
            currency,
            record: None,
        });
    }

    let service_name = resolve_service_name(&values, layout);

    let usage_date = values
        .get(layout.usage_start_date)
        .and_then(|v| normalize_date(v));
    let Some(usage_date) = usage_date else {
        return Some(ParsedRow {
            currency,
            record: None,
        });
    };

    Some(ParsedRow {
        currency,
        record: Some(BillingRecord {
            service_name,
            cost,
            usage_date,
        }),
    })
}

/// Prefer the net cost when present and positive, otherwise the gross cost.
fn resolve_cost(values: &[String], layout: &ColumnLayout) -> f64 {
    if let Some(idx) = layout.net_unblended_cost
        && let Some(value) = values.get(idx)
    {
        let net = parse_cost(value);
        if net > 0.0 {
            return net;
        }
    }

    values
        .get(layout.unblended_cost)
        .map(|v| parse_cost(v))
        .unwrap_or(0.0)
}

/// Service name priority: product JSON, service code, product code,
/// literal "Unknown".
fn resolve_service_name(values: &[String], layout: &ColumnLayout) -> String {
    if let Some(idx) = layout.product
        && let Some(value) = values.get(idx)
        && let ServiceNameProbe::Found(name) = probe_product_service_name(value)
    {
        return name;
    }

    for idx in [layout.service_code, layout.product_code].into_iter().flatten() {
        if let Some(value) = values.get(idx) {
            let name = strip_quotes(value).trim();
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }

    "Unknown".to_string()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_split_csv_line_plain() {
        assert_eq!(split_csv_line("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(split_csv_line("a,,c"), vec!["a", "", "c"]);
    }

    #[test]
    fn test_split_csv_line_quoted_comma() {
        assert_eq!(
            split_csv_line(r#"a,"b,c",d"#),
            vec!["a", "b,c", "d"]
        );
    }

    #[test]
    fn test_split_csv_line_doubled_quote() {
        assert_eq!(
            split_csv_line(r#""he said ""hi""",x"#),
            vec![r#"he said "hi""#, "x"]
        );
    }

    #[rstest]
    #[case("", 0.0)]
    #[case("   ", 0.0)]
    #[case("0", 0.0)]
    #[case("0.0", 0.0)]
    #[case("\"0.0\"", 0.0)]
    #[case("12.50", 12.5)]
    #[case("\"12.50\"", 12.5)]
    #[case("-3.25", -3.25)]
    #[case("not-a-number", 0.0)]
    fn test_parse_cost(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(parse_cost(input), expected);
    }

    #[test]
    fn test_probe_product_name() {
        let raw = r#"{""product_name"":""Amazon EC2"",""region"":""us-east-1""}"#;
        assert_eq!(
            probe_product_service_name(raw),
            ServiceNameProbe::Found("Amazon EC2".to_string())
        );
    }

    #[test]
    fn test_probe_falls_back_to_servicename_field() {
        let raw = r#"{""servicename"":""AWS Lambda""}"#;
        assert_eq!(
            probe_product_service_name(raw),
            ServiceNameProbe::Found("AWS Lambda".to_string())
        );
    }

    #[rstest]
    #[case("")]
    #[case("{}")]
    #[case("not json")]
    #[case(r#"{""region"":""us-east-1""}"#)]
    #[case(r#"{""product_name"":"#)]
    fn test_probe_not_found(#[case] raw: &str) {
        assert_eq!(probe_product_service_name(raw), ServiceNameProbe::NotFound);
    }

    #[test]
    fn test_normalize_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2026, 8, 15).expect("valid date");
        assert_eq!(normalize_date("2026-08-15"), Some(expected));
        assert_eq!(normalize_date("\"2026-08-15\""), Some(expected));
        assert_eq!(normalize_date("2026-08-15T00:00:00Z"), Some(expected));
        assert_eq!(normalize_date("2026-08-15 extra"), Some(expected));
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("yesterday"), None);
    }

    #[test]
    fn test_normalize_date_timestamp_converted_to_utc() {
        // 2026-08-16T05:00+09:00 is 2026-08-15T20:00Z.
        let expected = NaiveDate::from_ymd_opt(2026, 8, 15).expect("valid date");
        assert_eq!(normalize_date("2026-08-16T05:00:00+09:00"), Some(expected));
    }

    fn test_header() -> String {
        [
            columns::USAGE_START_DATE,
            columns::UNBLENDED_COST,
            columns::NET_UNBLENDED_COST,
            columns::CURRENCY_CODE,
            columns::PRODUCT,
            columns::PRODUCT_SERVICECODE,
            columns::PRODUCT_CODE,
        ]
        .join(",")
    }

    #[test]
    fn test_layout_from_header() {
        let layout = ColumnLayout::from_header(&test_header()).expect("layout should resolve");
        assert_eq!(layout.usage_start_date, 0);
        assert_eq!(layout.unblended_cost, 1);
        assert_eq!(layout.net_unblended_cost, Some(2));
        assert_eq!(layout.currency, 3);
        assert_eq!(layout.product, Some(4));
    }

    #[test]
    fn test_layout_missing_required_columns() {
        let result = ColumnLayout::from_header("product,product_servicecode");
        match result {
            Err(ParseError::MissingColumns(missing)) => {
                assert!(missing.contains(columns::USAGE_START_DATE));
                assert!(missing.contains(columns::UNBLENDED_COST));
                assert!(missing.contains(columns::CURRENCY_CODE));
            }
            other => panic!("Expected MissingColumns, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_layout_requires_a_service_column() {
        let header = [
            columns::USAGE_START_DATE,
            columns::UNBLENDED_COST,
            columns::CURRENCY_CODE,
        ]
        .join(",");
        assert!(matches!(
            ColumnLayout::from_header(&header),
            Err(ParseError::NoServiceColumn)
        ));
    }

    #[test]
    fn test_parse_row_prefers_positive_net_cost() {
        let layout = ColumnLayout::from_header(&test_header()).expect("layout");

        // Net cost zero falls back to the gross cost.
        let row = parse_row("2026-08-15,12.50,0.00,USD,,AmazonEC2,", &layout)
            .expect("row is wide enough");
        let record = row.record.expect("row should be admitted");
        assert_eq!(record.cost, 12.5);

        // Positive net cost wins.
        let row = parse_row("2026-08-15,12.50,5.25,USD,,AmazonEC2,", &layout)
            .expect("row is wide enough");
        let record = row.record.expect("row should be admitted");
        assert_eq!(record.cost, 5.25);
    }

    #[test]
    fn test_parse_row_service_name_priority() {
        let layout = ColumnLayout::from_header(&test_header()).expect("layout");

        let product = r#""{""product_name"":""Amazon EC2""}""#;
        let line = format!("2026-08-15,1.0,,USD,{},AmazonEC2,AmazonEC2Code", product);
        let record = parse_row(&line, &layout)
            .expect("row is wide enough")
            .record
            .expect("admitted");
        assert_eq!(record.service_name, "Amazon EC2");

        // Unparseable product JSON falls back to the service code.
        let line = "2026-08-15,1.0,,USD,oops,AmazonS3,AmazonS3Code";
        let record = parse_row(line, &layout)
            .expect("row is wide enough")
            .record
            .expect("admitted");
        assert_eq!(record.service_name, "AmazonS3");

        // Nothing resolvable at all.
        let line = "2026-08-15,1.0,,USD,,,";
        let record = parse_row(line, &layout)
            .expect("row is wide enough")
            .record
            .expect("admitted");
        assert_eq!(record.service_name, "Unknown");
    }

    #[test]
    fn test_parse_row_short_row_dropped() {
        let layout = ColumnLayout::from_header(&test_header()).expect("layout");
        assert!(parse_row("2026-08-15,1.0", &layout).is_none());
    }

    #[test]
    fn test_parse_row_zero_cost_not_admitted_but_currency_captured() {
        let layout = ColumnLayout::from_header(&test_header()).expect("layout");
        let row = parse_row("2026-08-15,0,0,USD,,AmazonEC2,", &layout)
            .expect("row is wide enough");
        assert!(row.record.is_none());
        assert_eq!(row.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_parse_row_bad_date_dropped() {
        let layout = ColumnLayout::from_header(&test_header()).expect("layout");
        let row = parse_row("someday,1.0,,USD,,AmazonEC2,", &layout)
            .expect("row is wide enough");
        assert!(row.record.is_none());
    }
}
