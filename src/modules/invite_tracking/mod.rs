pub mod commands;
pub mod events;
pub mod ledger;
pub mod referrals;
pub mod tracking;

use crate::modules::Module;

pub use ledger::ReferralLedger;
pub use referrals::{MembershipQueue, ReferralTracker};
pub use tracking::AttributionEngine;

pub fn module() -> Module {
    Module {
        id: "invite_tracking",
        commands: commands::commands(),
        event_handlers: vec![events::handler],
    }
}
