// Buy guards and exit triggers
pub mod eligibility;

pub use eligibility::{assess_buy, BuyContext, BuyEligibility, ExitDecision, ExitThresholds};
