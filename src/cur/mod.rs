//! Cost and Usage Report domain logic: billing periods, export version
//! resolution, CSV parsing, and per-group aggregation.

pub mod aggregate;
pub mod columns;
pub mod parser;
pub mod period;
pub mod version;

pub use aggregate::GroupAggregation;
pub use parser::{BillingRecord, ColumnLayout, ParseError, ServiceNameProbe};
pub use period::{BillingPeriod, extract_billing_period, extract_version_token};
pub use version::{is_eligible, latest_version_per_group};
