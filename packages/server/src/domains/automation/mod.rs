pub mod dedupe;
pub mod engine;
pub mod error;
pub mod models;
pub mod prompts;
pub mod schedule;
pub mod settings_cache;

pub use dedupe::DuplicateActionLock;
pub use engine::{ConfigState, Dispatch, ReconcileReport, ScheduleEngine};
pub use error::{ActionError, ErrorKind};
pub use models::*;
pub use schedule::{cron_expressions, evaluate, next_trigger_after, DueDecision};
pub use settings_cache::SettingsCache;
