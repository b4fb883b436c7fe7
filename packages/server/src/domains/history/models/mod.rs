pub mod history;

pub use history::{AutomationHistoryEntry, HistoryOutcome};
