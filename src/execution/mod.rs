// Trade execution, price collection and the control loop
pub mod engine;
pub mod executor;
pub mod position_manager;
pub mod price_feed;

pub use engine::{TickSummary, TradingEngine};
pub use executor::{PendingSwap, TransactionExecutor};
pub use position_manager::{BuyOutcome, PositionLifecycleManager};
pub use price_feed::PriceIngestor;
