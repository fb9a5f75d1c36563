pub mod beta_slot_repository;
pub mod mock_db;
pub mod postgres_beta_slot_repository;
pub mod postgres_shop_repository;
pub mod postgres_stripe_event_log_repository;
pub mod postgres_tenant_repository;
pub mod shop_repository;
pub mod stripe_event_log_repository;
pub mod tenant_repository;
