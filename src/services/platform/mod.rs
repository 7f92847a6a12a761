//! The slice of the Discord API the automation needs, behind a trait so the
//! engines can be driven by an in-memory guild in tests.

use crate::config::RoleRef;
use crate::services::errors::AutomationError;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;

mod discord;
#[cfg(test)]
pub mod fake;

pub use discord::SerenityPlatform;

/// Live usage counter of one invite code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteUsage {
    pub code: String,
    pub uses: u64,
    pub inviter_id: Option<serenity::UserId>,
}

#[derive(Debug, Clone)]
pub struct GuildProfile {
    pub name: String,
    pub vanity_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GuildRole {
    pub id: serenity::RoleId,
    pub name: String,
    pub position: u16,
    pub managed: bool,
}

/// Guild roles together with the position of the bot's highest role.
#[derive(Debug, Clone)]
pub struct RoleHierarchy {
    pub roles: Vec<GuildRole>,
    pub bot_top_position: u16,
}

impl RoleHierarchy {
    pub fn resolve(&self, role: &RoleRef) -> Result<serenity::RoleId, AutomationError> {
        let found = match role {
            RoleRef::Id(id) => self.roles.iter().find(|r| r.id == *id),
            RoleRef::Name(name) => self.roles.iter().find(|r| r.name == *name),
        };

        found
            .map(|r| r.id)
            .ok_or_else(|| AutomationError::role_not_found(role.to_string()))
    }

    pub fn resolve_optional(
        &self,
        role: Option<&RoleRef>,
    ) -> Result<Option<serenity::RoleId>, AutomationError> {
        role.map(|r| self.resolve(r)).transpose()
    }

    /// The bot may only grant or revoke roles strictly below its own highest role.
    pub fn ensure_manageable(&self, role_id: serenity::RoleId) -> Result<(), AutomationError> {
        let role = self
            .roles
            .iter()
            .find(|r| r.id == role_id)
            .ok_or_else(|| AutomationError::role_not_found(role_id.to_string()))?;

        if role.managed || role.position >= self.bot_top_position {
            return Err(AutomationError::ConfigurationError { role_id });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionCount {
    /// Unicode emoji, or the name of a custom emoji.
    pub emoji: String,
    pub count: u64,
    /// Whether the bot itself placed this reaction.
    pub me: bool,
}

#[derive(Debug, Clone)]
pub struct PlatformMessage {
    pub id: serenity::MessageId,
    pub channel_id: serenity::ChannelId,
    pub author_id: serenity::UserId,
    pub mentions: Vec<serenity::UserId>,
    pub reactions: Vec<ReactionCount>,
}

#[async_trait::async_trait]
pub trait GuildPlatform: Send + Sync {
    fn bot_id(&self) -> serenity::UserId;

    async fn guild_profile(&self, guild_id: serenity::GuildId)
    -> Result<GuildProfile, AutomationError>;

    async fn fetch_invites(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<Vec<InviteUsage>, AutomationError>;

    async fn role_hierarchy(
        &self,
        guild_id: serenity::GuildId,
    ) -> Result<RoleHierarchy, AutomationError>;

    async fn member_roles(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
    ) -> Result<HashSet<serenity::RoleId>, AutomationError>;

    /// Every member currently holding `role_id`.
    async fn role_members(
        &self,
        guild_id: serenity::GuildId,
        role_id: serenity::RoleId,
    ) -> Result<Vec<serenity::UserId>, AutomationError>;

    async fn grant_role(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        role_id: serenity::RoleId,
        reason: &str,
    ) -> Result<(), AutomationError>;

    async fn revoke_role(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        role_id: serenity::RoleId,
        reason: &str,
    ) -> Result<(), AutomationError>;

    async fn send_message(
        &self,
        channel_id: serenity::ChannelId,
        content: &str,
    ) -> Result<serenity::MessageId, AutomationError>;

    async fn react(
        &self,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
        emoji: &str,
    ) -> Result<(), AutomationError>;

    async fn fetch_message(
        &self,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Result<PlatformMessage, AutomationError>;

    async fn delete_message(
        &self,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Result<(), AutomationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> RoleHierarchy {
        RoleHierarchy {
            roles: vec![
                GuildRole {
                    id: serenity::RoleId::new(1),
                    name: "OG".into(),
                    position: 5,
                    managed: false,
                },
                GuildRole {
                    id: serenity::RoleId::new(2),
                    name: "Admin".into(),
                    position: 20,
                    managed: false,
                },
                GuildRole {
                    id: serenity::RoleId::new(3),
                    name: "Booster".into(),
                    position: 2,
                    managed: true,
                },
            ],
            bot_top_position: 10,
        }
    }

    #[test]
    fn resolves_by_name_and_id() {
        let h = hierarchy();
        assert_eq!(h.resolve(&RoleRef::Name("OG".into())).unwrap(), serenity::RoleId::new(1));
        assert_eq!(
            h.resolve(&RoleRef::Id(serenity::RoleId::new(2))).unwrap(),
            serenity::RoleId::new(2)
        );
        assert!(matches!(
            h.resolve(&RoleRef::Name("Missing".into())),
            Err(AutomationError::NotFound { kind: "role", .. })
        ));
    }

    #[test]
    fn refuses_roles_at_or_above_the_bot() {
        let h = hierarchy();
        assert!(h.ensure_manageable(serenity::RoleId::new(1)).is_ok());
        assert!(matches!(
            h.ensure_manageable(serenity::RoleId::new(2)),
            Err(AutomationError::ConfigurationError { .. })
        ));
        assert!(matches!(
            h.ensure_manageable(serenity::RoleId::new(3)),
            Err(AutomationError::ConfigurationError { .. })
        ));
    }
}
