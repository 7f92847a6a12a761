use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use tracing::debug;

pub fn handler<'a>(
    _ctx: &'a serenity::Context,
    event: &'a serenity::FullEvent,
    data: &'a Data,
) -> poise::BoxFuture<'a, Result<(), Error>> {
    Box::pin(async move {
        let target = match event {
            serenity::FullEvent::ReactionAdd { add_reaction } => {
                // The bot's own seed reaction is never a vote
                if add_reaction.user_id == Some(data.platform.bot_id()) {
                    return Ok(());
                }
                Some((add_reaction.channel_id, add_reaction.message_id))
            }
            serenity::FullEvent::ReactionRemove { removed_reaction } => {
                Some((removed_reaction.channel_id, removed_reaction.message_id))
            }
            serenity::FullEvent::ReactionRemoveAll {
                channel_id,
                removed_from_message_id,
            } => Some((*channel_id, *removed_from_message_id)),
            serenity::FullEvent::ReactionRemoveEmoji { removed_reactions } => {
                Some((removed_reactions.channel_id, removed_reactions.message_id))
            }
            _ => None,
        };

        let Some((channel_id, message_id)) = target else {
            return Ok(());
        };
        if channel_id != data.config.appeal_channel_id {
            return Ok(());
        }

        let result = data
            .appeals
            .retally(data.platform.as_ref(), &data.roles, channel_id, message_id)
            .await?;
        debug!("Appeal {} tallied: {:?}", message_id, result);

        Ok(())
    })
}
