pub mod billing;
pub mod billing_month;
