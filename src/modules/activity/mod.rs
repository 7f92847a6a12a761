pub mod events;
pub mod runner;
pub mod tracker;

use crate::modules::Module;

pub use tracker::{ActivityTracker, SystemClock};

pub fn module() -> Module {
    Module {
        id: "activity",
        commands: vec![],
        event_handlers: vec![events::handler],
    }
}
