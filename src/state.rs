use std::sync::Arc;

use crate::config::Config;
use crate::db::{
    beta_slot_repository::BetaSlotRepository, shop_repository::ShopRepository,
    stripe_event_log_repository::StripeEventLogRepository, tenant_repository::TenantRepository,
};
use crate::services::stripe::StripeService;
use crate::utils::jwt::JwtKeys;

#[derive(Clone)]
pub struct AppState {
    pub tenants: Arc<dyn TenantRepository>,
    pub shop: Arc<dyn ShopRepository>,
    pub event_log: Arc<dyn StripeEventLogRepository>,
    pub beta_slots: Arc<dyn BetaSlotRepository>,
    pub stripe: Arc<dyn StripeService>,
    pub config: Arc<Config>,
    pub jwt_keys: Arc<JwtKeys>,
}
