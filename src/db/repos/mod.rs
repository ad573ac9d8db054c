mod billing_files;
mod cost_reports;
mod project_connections;

pub use billing_files::*;
pub use cost_reports::*;
pub use project_connections::*;
