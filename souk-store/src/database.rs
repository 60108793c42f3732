use serde_json::Value;
use souk_core::rules::BusinessRules;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rows of the `business_rules` table on top of the configured
    /// defaults. Each row stores `{"value": <number>}`.
    pub async fn fetch_business_rules(&self, defaults: BusinessRules) -> Result<BusinessRules, sqlx::Error> {
        let rows = sqlx::query("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            let key: String = row.try_get("rule_key")?;
            let value: Value = row.try_get("rule_value")?;
            if !apply_rule(&mut rules, &key, &value) {
                warn!("Ignoring business rule override {} = {}", key, value);
            }
        }
        Ok(rules)
    }
}

fn apply_rule(rules: &mut BusinessRules, key: &str, raw: &Value) -> bool {
    let Some(v) = raw.get("value") else {
        return false;
    };
    match key {
        "delivery_surcharge_cents" => v.as_i64().map(|n| rules.delivery_surcharge_cents = n).is_some(),
        "claim_window_seconds" => v.as_i64().map(|n| rules.claim_window_seconds = n).is_some(),
        "throttle_max_open_lines" => v.as_i64().map(|n| rules.throttle_max_open_lines = n).is_some(),
        "throttle_window_days" => v.as_i64().map(|n| rules.throttle_window_days = n).is_some(),
        "max_unordered_cart_items" => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .map(|n| rules.max_unordered_cart_items = n)
            .is_some(),
        "sweep_interval_seconds" => v.as_u64().map(|n| rules.sweep_interval_seconds = n).is_some(),
        _ => false,
    }
}
