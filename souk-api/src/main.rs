use anyhow::Context;
use souk_api::{app, auth::issue_token, worker, AppState, AuthConfig};
use souk_core::identity::{Principal, Role};
use souk_core::notify::{LogNotificationSink, NotificationSink};
use souk_core::repository::MarketStore;
use souk_order::{ExpirySweeper, MarketContext};
use souk_store::app_config::Config;
use souk_store::{DbClient, EventProducer, KafkaNotificationSink, MemoryStore, PgMarketStore, RedisClient};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "souk_api=debug,souk_order=debug,souk_store=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let auth = AuthConfig {
        secret: config.auth.jwt_secret.clone(),
        expiration: config.auth.jwt_expiration_seconds,
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("token") {
        let principal = parse_principal(&args[1..])?;
        println!("{}", issue_token(&auth, &principal)?);
        return Ok(());
    }
    let in_memory = args.iter().any(|a| a == "--memory");

    let (store, rules) = if in_memory {
        tracing::warn!("Running on the in-memory store, nothing will be persisted");
        let store: Arc<dyn MarketStore> = Arc::new(MemoryStore::new());
        (store, config.business_rules.clone())
    } else {
        let db = DbClient::new(&config.database.url)
            .await
            .context("Failed to connect to Postgres")?;
        db.migrate().await.context("Failed to run migrations")?;
        let rules = db
            .fetch_business_rules(config.business_rules.clone())
            .await
            .context("Failed to load business rules")?;
        let store: Arc<dyn MarketStore> = Arc::new(PgMarketStore::new(db.pool.clone()));
        (store, rules)
    };

    let sink: Arc<dyn NotificationSink> = match &config.kafka {
        Some(kafka) => {
            let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            Arc::new(KafkaNotificationSink::new(producer, kafka.notification_topic.clone()))
        }
        None => Arc::new(LogNotificationSink),
    };

    let redis = match &config.redis {
        Some(redis) => match RedisClient::new(&redis.url).await {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!("Redis unavailable, rate limiting disabled: {}", e);
                None
            }
        },
        None => None,
    };

    let sweep_every = Duration::from_secs(rules.sweep_interval_seconds.max(1));
    let market = MarketContext::new(store, sink, rules);
    tokio::spawn(worker::start_expiry_worker(ExpirySweeper::new(market.clone()), sweep_every));

    let app = app(AppState::new(market, redis, auth));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Starting Souk API on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// `token <ROLE> <USER_ID> [PROFILE_ID]`
fn parse_principal(args: &[String]) -> anyhow::Result<Principal> {
    let [role, user_id, rest @ ..] = args else {
        anyhow::bail!("usage: souk-api token <CLIENT|VENDOR|DELIVERY_AGENT|SUPERUSER> <USER_ID> [PROFILE_ID]");
    };
    let user_id = user_id.parse().context("USER_ID must be a number")?;
    let profile_id = || -> anyhow::Result<i64> {
        rest.first()
            .context("PROFILE_ID is required for this role")?
            .parse()
            .context("PROFILE_ID must be a number")
    };
    let role = match role.as_str() {
        "CLIENT" => Role::Client(profile_id()?),
        "VENDOR" => Role::Vendor(profile_id()?),
        "DELIVERY_AGENT" => Role::DeliveryAgent(profile_id()?),
        "SUPERUSER" => Role::Superuser,
        other => anyhow::bail!("unknown role {}", other),
    };
    Ok(Principal::new(user_id, role))
}
