pub mod guard;
pub mod models;

pub use guard::{days_remaining, GuardDecision, SubscriptionGuard};
pub use models::*;
