use souk_order::{
    CancellationDesk, CartService, CheckoutSplitter, ClaimArbiter, ExpirySweeper, Inbox, MarketContext,
    OrderManager,
};
use souk_store::RedisClient;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub market: MarketContext,
    /// Rate limiting is skipped when no Redis is configured.
    pub redis: Option<Arc<RedisClient>>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(market: MarketContext, redis: Option<Arc<RedisClient>>, auth: AuthConfig) -> Self {
        Self { market, redis, auth }
    }

    pub fn cart(&self) -> CartService {
        CartService::new(self.market.clone())
    }

    pub fn checkout(&self) -> CheckoutSplitter {
        CheckoutSplitter::new(self.market.clone())
    }

    pub fn orders(&self) -> OrderManager {
        OrderManager::new(self.market.clone())
    }

    pub fn claims(&self) -> ClaimArbiter {
        ClaimArbiter::new(self.market.clone())
    }

    pub fn cancellations(&self) -> CancellationDesk {
        CancellationDesk::new(self.market.clone())
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(self.market.clone())
    }

    pub fn inbox(&self) -> Inbox {
        Inbox::new(self.market.clone())
    }
}
