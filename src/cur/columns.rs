//! Header column names of the supported CUR 2.0 export revision.

pub const USAGE_START_DATE: &str = "line_item_usage_start_date";
pub const UNBLENDED_COST: &str = "line_item_unblended_cost";
pub const NET_UNBLENDED_COST: &str = "line_item_net_unblended_cost";
pub const CURRENCY_CODE: &str = "line_item_currency_code";
pub const PRODUCT: &str = "product";
pub const PRODUCT_SERVICECODE: &str = "product_servicecode";
pub const PRODUCT_CODE: &str = "line_item_product_code";
