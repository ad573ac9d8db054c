mod billing_files;
mod common;
mod cost_reports;
mod project_connections;

pub use billing_files::SqliteBillingFileRepo;
pub use cost_reports::SqliteCostReportRepo;
pub use project_connections::SqliteProjectConnectionRepo;
