use super::{
    GuildPlatform, GuildProfile, GuildRole, InviteUsage, PlatformMessage, ReactionCount,
    RoleHierarchy,
};
use crate::services::errors::AutomationError;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;

const MEMBER_PAGE_SIZE: u64 = 1000;

/// `GuildPlatform` backed by the Discord REST API.
pub struct SerenityPlatform {
    http: Arc<serenity::Http>,
    bot_id: serenity::UserId,
}

impl SerenityPlatform {
    pub fn new(http: Arc<serenity::Http>, bot_id: serenity::UserId) -> Self {
        Self { http, bot_id }
    }
}

fn emoji_key(reaction: &serenity::ReactionType) -> String {
    match reaction {
        serenity::ReactionType::Unicode(s) => s.clone(),
        serenity::ReactionType::Custom { name, id, .. } => {
            name.clone().unwrap_or_else(|| id.to_string())
        }
        _ => String::new(),
    }
}

#[async_trait::async_trait]
impl GuildPlatform for SerenityPlatform {
    fn bot_id(&self) -> serenity::UserId {
        self.bot_id
    }

    async fn guild_profile(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<GuildProfile, AutomationError> {
        let guild = guild_id.to_partial_guild(&self.http).await?;

        Ok(GuildProfile {
            name: guild.name,
            vanity_code: guild.vanity_url_code,
        })
    }

    async fn fetch_invites(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<Vec<InviteUsage>, AutomationError> {
        let invites = guild_id.invites(&self.http).await?;

        Ok(invites
            .into_iter()
            .map(|invite| InviteUsage {
                code: invite.code,
                uses: invite.uses,
                inviter_id: invite.inviter.map(|u| u.id),
            })
            .collect())
    }

    async fn role_hierarchy(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<RoleHierarchy, AutomationError> {
        let guild_roles = guild_id.roles(&self.http).await?;
        let bot_member = guild_id.member(&self.http, self.bot_id).await?;

        let bot_top_position = bot_member
            .roles
            .iter()
            .filter_map(|r| guild_roles.get(r))
            .map(|r| r.position)
            .max()
            .unwrap_or(0);

        let roles = guild_roles
            .into_values()
            .map(|role| GuildRole {
                id: role.id,
                name: role.name,
                position: role.position,
                managed: role.managed,
            })
            .collect();

        Ok(RoleHierarchy {
            roles,
            bot_top_position,
        })
    }

    async fn member_roles(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
    ) -> Result<HashSet<serenity::RoleId>, AutomationError> {
        let member = guild_id.member(&self.http, user_id).await?;
        Ok(member.roles.into_iter().collect())
    }

    async fn role_members(
        &self,
        guild_id: serenity::GuildId,
        role_id: serenity::RoleId,
    ) -> Result<Vec<serenity::UserId>, AutomationError> {
        let mut holders = Vec::new();
        let mut after: Option<serenity::UserId> = None;

        loop {
            let page = guild_id
                .members(&self.http, Some(MEMBER_PAGE_SIZE), after)
                .await?;
            let page_len = page.len() as u64;
            after = page.last().map(|m| m.user.id);

            holders.extend(
                page.into_iter()
                    .filter(|m| m.roles.contains(&role_id))
                    .map(|m| m.user.id),
            );

            if page_len < MEMBER_PAGE_SIZE || after.is_none() {
                break;
            }
        }

        Ok(holders)
    }

    async fn grant_role(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        role_id: serenity::RoleId,
        reason: &str,
    ) -> Result<(), AutomationError> {
        self.http
            .add_member_role(guild_id, user_id, role_id, Some(reason))
            .await?;
        Ok(())
    }

    async fn revoke_role(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        role_id: serenity::RoleId,
        reason: &str,
    ) -> Result<(), AutomationError> {
        self.http
            .remove_member_role(guild_id, user_id, role_id, Some(reason))
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: serenity::ChannelId,
        content: &str,
    ) -> Result<serenity::MessageId, AutomationError> {
        let message = channel_id.say(&self.http, content).await?;
        Ok(message.id)
    }

    async fn react(
        &self,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
        emoji: &str,
    ) -> Result<(), AutomationError> {
        channel_id
            .create_reaction(
                &self.http,
                message_id,
                serenity::ReactionType::Unicode(emoji.to_string()),
            )
            .await?;
        Ok(())
    }

    async fn fetch_message(
        &self,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Result<PlatformMessage, AutomationError> {
        let message = channel_id.message(&self.http, message_id).await?;

        Ok(PlatformMessage {
            id: message.id,
            channel_id: message.channel_id,
            author_id: message.author.id,
            mentions: message.mentions.iter().map(|u| u.id).collect(),
            reactions: message
                .reactions
                .iter()
                .map(|r| ReactionCount {
                    emoji: emoji_key(&r.reaction_type),
                    count: r.count,
                    me: r.me,
                })
                .collect(),
        })
    }

    async fn delete_message(
        &self,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Result<(), AutomationError> {
        channel_id.delete_message(&self.http, message_id).await?;
        Ok(())
    }
}
