pub mod cancellation;
pub mod cart;
pub mod checkout;
pub mod claims;
pub mod context;
pub mod inbox;
pub mod manager;
pub mod outbox;
pub mod sweep;

pub use cancellation::CancellationDesk;
pub use cart::CartService;
pub use checkout::{CheckoutReceipt, CheckoutRequest, CheckoutSplitter, PlacedOrder};
pub use claims::ClaimArbiter;
pub use context::MarketContext;
pub use inbox::Inbox;
pub use manager::{OrderDetails, OrderManager};
pub use outbox::{Outbox, Pending};
pub use sweep::{ExpirySweeper, SweepReport};
