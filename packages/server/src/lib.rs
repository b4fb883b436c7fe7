// GBP Automation - scheduling core
//
// Decides when automated Business Profile actions (posts, review replies) fire
// for every tenant and location, gates them on subscription state, keeps them
// at-most-once per trigger, and makes sure only one replica runs the scheduler.
//
// Domain logic lives in domains/*; infrastructure traits and adapters in kernel/.

pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
