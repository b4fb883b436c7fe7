pub mod coordinator;
pub mod models;

pub use coordinator::LeaderCoordinator;
pub use models::*;
