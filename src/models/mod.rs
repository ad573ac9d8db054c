mod billing_file;
mod cost_report;
mod project_connection;

pub use billing_file::*;
pub use cost_report::*;
pub use project_connection::*;
