use std::env;

pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Price the subscription checkout sells.
    pub price_id: String,
}

pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub stripe: StripeSettings,
    pub beta_slot_cap: i64,
    pub jwt_issuer: String,
    pub jwt_audience: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let frontend_origin = env::var("FRONTEND_ORIGIN").expect("FRONTEND_ORIGIN must be set");

        let stripe = StripeSettings {
            secret_key: env::var("STRIPE_SECRET_KEY").expect("STRIPE_SECRET_KEY must be set"),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .expect("STRIPE_WEBHOOK_SECRET must be set"),
            price_id: env::var("STRIPE_PRICE_ID").expect("STRIPE_PRICE_ID must be set"),
        };

        let beta_slot_cap = env::var("BETA_SLOT_CAP")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(25);

        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "shopdesk".to_string());
        let jwt_audience =
            env::var("JWT_AUDIENCE").unwrap_or_else(|_| "shopdesk-app".to_string());

        Config {
            database_url,
            frontend_origin,
            stripe,
            beta_slot_cap,
            jwt_issuer,
            jwt_audience,
        }
    }
}
