pub mod errors;
pub mod event_manager;
pub mod localization;
pub mod platform;
pub mod role_policy;
pub mod startup;
