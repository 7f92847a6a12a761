pub mod events;
pub mod tally;

use crate::modules::Module;

pub use tally::AppealTallier;

pub fn module() -> Module {
    Module {
        id: "appeals",
        commands: vec![],
        event_handlers: vec![events::handler],
    }
}
