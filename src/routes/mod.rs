pub mod admin;
pub mod auth;
pub mod billing;
pub mod invoices;
pub mod stripe;
pub mod work_orders;
