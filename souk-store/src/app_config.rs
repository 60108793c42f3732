use serde::Deserialize;
use souk_core::rules::BusinessRules;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Rate limiting is skipped when absent.
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    /// Notifications are only logged when absent.
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_notification_topic")]
    pub notification_topic: String,
}

fn default_notification_topic() -> String {
    "souk.notifications".into()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SOUK_BUSINESS_RULES__CLAIM_WINDOW_SECONDS=600`
            .add_source(config::Environment::with_prefix("SOUK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    #[test]
    fn test_business_rules_default_when_section_missing() {
        let raw = r#"
            [server]
            port = 3000
            [database]
            url = "postgres://localhost/souk"
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
        "#;
        let config: Config = config::Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.redis.is_none());
        assert!(config.kafka.is_none());
        assert_eq!(config.business_rules, BusinessRules::default());
    }

    #[test]
    fn test_partial_business_rules_override() {
        let raw = r#"
            [server]
            port = 3000
            [database]
            url = "postgres://localhost/souk"
            [auth]
            jwt_secret = "secret"
            jwt_expiration_seconds = 3600
            [kafka]
            brokers = "localhost:9092"
            [business_rules]
            claim_window_seconds = 600
        "#;
        let config: Config = config::Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.business_rules.claim_window_seconds, 600);
        assert_eq!(config.business_rules.delivery_surcharge_cents, 2000);
        assert_eq!(config.kafka.unwrap().notification_topic, "souk.notifications");
    }
}
