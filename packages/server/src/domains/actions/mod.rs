pub mod executor;

pub use executor::{ActionExecutor, ActionOutcome, ExecutorSettings};
