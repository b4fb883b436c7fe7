pub mod leadership;

pub use leadership::{LeadershipRecord, SCHEDULER_ROLE};
