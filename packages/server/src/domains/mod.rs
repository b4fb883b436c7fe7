// Automation domains
pub mod actions;
pub mod automation;
pub mod credentials;
pub mod history;
pub mod leadership;
pub mod reviews;
pub mod subscriptions;
