use crate::modules::{get_modules, EventHandler};
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

fn module_handlers() -> &'static [(&'static str, EventHandler)] {
    static HANDLERS: OnceLock<Vec<(&'static str, EventHandler)>> = OnceLock::new();

    HANDLERS.get_or_init(|| {
        get_modules()
            .into_iter()
            .flat_map(|module| {
                let id = module.id;
                module.event_handlers.into_iter().map(move |h| (id, h))
            })
            .collect()
    })
}

/// Fans every gateway event out to the module handlers, each in its own task,
/// so one slow or failing handler never holds up the others.
pub async fn dispatch(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Ready { data_about_bot } = event {
        info!("Logged in as {}", data_about_bot.user.name);
    }

    let event_arc = Arc::new(event.clone());

    for &(module_id, handler) in module_handlers() {
        let ctx = ctx.clone();
        let event_arc = event_arc.clone();
        let data = data.clone();

        tokio::spawn(async move {
            if let Err(e) = handler(&ctx, &event_arc, &data).await {
                error!("Error in event handler for module {}: {:#}", module_id, e);
            }
        });
    }

    Ok(())
}
