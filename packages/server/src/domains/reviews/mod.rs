pub mod models;
pub mod poller;

pub use models::*;
pub use poller::{PollReport, ReviewPoller};
