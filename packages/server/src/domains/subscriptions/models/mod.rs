pub mod subscription;

pub use subscription::{SubscriptionRecord, SubscriptionStatus};
