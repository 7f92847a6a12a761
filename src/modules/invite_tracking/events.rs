use crate::modules::invite_tracking::referrals::MembershipEvent;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;

/// Forwards joins and leaves to the membership queue, which handles them in order.
pub fn handler<'a>(
    _ctx: &'a serenity::Context,
    event: &'a serenity::FullEvent,
    data: &'a Data,
) -> poise::BoxFuture<'a, Result<(), Error>> {
    Box::pin(async move {
        let membership = match event {
            serenity::FullEvent::GuildMemberAddition { new_member } => MembershipEvent::Joined {
                guild_id: new_member.guild_id,
                user_id: new_member.user.id,
                is_bot: new_member.user.bot,
            },
            serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
                MembershipEvent::Left {
                    guild_id: *guild_id,
                    user_id: user.id,
                    is_bot: user.bot,
                }
            }
            _ => return Ok(()),
        };

        data.membership.push(membership)
    })
}
