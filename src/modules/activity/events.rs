use crate::{Data, Error};
use poise::serenity_prelude as serenity;

pub fn handler<'a>(
    _ctx: &'a serenity::Context,
    event: &'a serenity::FullEvent,
    data: &'a Data,
) -> poise::BoxFuture<'a, Result<(), Error>> {
    Box::pin(async move {
        match event {
            serenity::FullEvent::Message { new_message } => {
                if new_message.guild_id == Some(data.config.guild_id) && !new_message.author.bot {
                    data.activity.touch(new_message.author.id);
                }
            }
            serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
                if *guild_id == data.config.guild_id {
                    data.activity.forget(user.id);
                }
            }
            _ => {}
        }
        Ok(())
    })
}
