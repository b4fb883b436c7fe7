pub mod action;
pub mod cadence;
pub mod settings;

pub use action::{ActionKey, ActionKind};
pub use cadence::{parse_time_of_day, Cadence, UnknownCadence};
pub use settings::{
    AutomationSettingsRow, BusinessProfile, SettingsRowError, TenantAutomationConfig,
    UpsertAutomationSettings,
};
