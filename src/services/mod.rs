pub mod beta;
pub mod billing;
pub mod stripe;
