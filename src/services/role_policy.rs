use crate::config::BotConfig;
use crate::services::errors::AutomationError;
use crate::services::localization::LocalizationManager;
use crate::services::platform::{GuildPlatform, RoleHierarchy};
use fluent::FluentArgs;
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Referral tiers with their roles already resolved against the guild.
#[derive(Debug, Clone)]
pub struct TierPolicy {
    pub senior: serenity::RoleId,
    pub junior: serenity::RoleId,
    pub prerequisite: Option<serenity::RoleId>,
    pub promotion_threshold: i32,
    pub senior_capacity: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleMutation {
    Grant(serenity::RoleId),
    Revoke(serenity::RoleId),
    None,
}

/// Maps a referral count onto the tier role the member should be granted.
/// Grants are additive; this never strips the other tier.
pub fn decide(
    count: i32,
    current: &HashSet<serenity::RoleId>,
    policy: &TierPolicy,
    senior_holders: usize,
) -> RoleMutation {
    if count >= policy.promotion_threshold {
        let has_room = policy
            .senior_capacity
            .map_or(true, |capacity| senior_holders < capacity);
        let prerequisite_met = policy
            .prerequisite
            .map_or(true, |role| current.contains(&role));

        if !current.contains(&policy.senior) && has_room && prerequisite_met {
            return RoleMutation::Grant(policy.senior);
        }
    } else if !current.contains(&policy.junior) {
        return RoleMutation::Grant(policy.junior);
    }

    RoleMutation::None
}

/// Applies role mutations against the guild, refusing roles the bot cannot manage.
pub struct RoleService {
    config: Arc<BotConfig>,
    l10n: Arc<LocalizationManager>,
}

impl RoleService {
    pub fn new(config: Arc<BotConfig>, l10n: Arc<LocalizationManager>) -> Self {
        Self { config, l10n }
    }

    pub fn tier_policy(&self, hierarchy: &RoleHierarchy) -> Result<TierPolicy, AutomationError> {
        let tiers = &self.config.tiers;
        Ok(TierPolicy {
            senior: hierarchy.resolve(&tiers.senior)?,
            junior: hierarchy.resolve(&tiers.junior)?,
            prerequisite: hierarchy.resolve_optional(tiers.senior_prerequisite.as_ref())?,
            promotion_threshold: tiers.promotion_threshold,
            senior_capacity: tiers.senior_capacity,
        })
    }

    /// Grants or revokes one role. Returns whether the member's roles changed;
    /// granting a held role or revoking a missing one is a successful no-op.
    pub async fn apply(
        &self,
        platform: &dyn GuildPlatform,
        hierarchy: &RoleHierarchy,
        user_id: serenity::UserId,
        current: &mut HashSet<serenity::RoleId>,
        mutation: RoleMutation,
        reason: &str,
    ) -> Result<bool, AutomationError> {
        let guild_id = self.config.guild_id;

        match mutation {
            RoleMutation::None => Ok(false),
            RoleMutation::Grant(role_id) => {
                hierarchy.ensure_manageable(role_id)?;
                if current.contains(&role_id) {
                    return Ok(false);
                }
                platform.grant_role(guild_id, user_id, role_id, reason).await?;
                current.insert(role_id);
                Ok(true)
            }
            RoleMutation::Revoke(role_id) => {
                hierarchy.ensure_manageable(role_id)?;
                if !current.contains(&role_id) {
                    return Ok(false);
                }
                platform.revoke_role(guild_id, user_id, role_id, reason).await?;
                current.remove(&role_id);
                Ok(true)
            }
        }
    }

    /// Re-derives the inviter's tier from `count` and applies it.
    pub async fn apply_referral_tier(
        &self,
        platform: &dyn GuildPlatform,
        inviter_id: serenity::UserId,
        count: i32,
    ) -> Result<RoleMutation, AutomationError> {
        let guild_id = self.config.guild_id;
        let hierarchy = platform.role_hierarchy(guild_id).await?;
        let policy = self.tier_policy(&hierarchy)?;
        let mut current = platform.member_roles(guild_id, inviter_id).await?;

        let senior_holders = match policy.senior_capacity {
            Some(_) if count >= policy.promotion_threshold => {
                platform.role_members(guild_id, policy.senior).await?.len()
            }
            _ => 0,
        };

        let mutation = decide(count, &current, &policy, senior_holders);

        let reason_key = if mutation == RoleMutation::Grant(policy.senior) {
            "referral-reason-senior"
        } else {
            "referral-reason-junior"
        };
        let reason = self.l10n.t(reason_key, None);

        let changed = self
            .apply(platform, &hierarchy, inviter_id, &mut current, mutation, &reason)
            .await?;

        if changed && mutation == RoleMutation::Grant(policy.senior) {
            info!("Promoted {} to the senior role with {} referrals", inviter_id, count);
            let role_name = hierarchy
                .roles
                .iter()
                .find(|r| r.id == policy.senior)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| self.config.tiers.senior.to_string());

            let mut args = FluentArgs::new();
            args.set("user", format!("<@{}>", inviter_id));
            args.set("role", role_name);
            args.set("threshold", policy.promotion_threshold);

            let text = self.l10n.t("referral-senior-granted", Some(&args));
            if let Err(e) = platform
                .send_message(self.config.general_channel_id, &text)
                .await
            {
                warn!("Failed to announce promotion of {}: {}", inviter_id, e);
            }
        }

        Ok(mutation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::services::platform::fake::{FakePlatform, RoleChange};

    const SENIOR: u64 = 1;
    const JUNIOR: u64 = 2;
    const VERIFIED: u64 = 3;

    fn role(id: u64) -> serenity::RoleId {
        serenity::RoleId::new(id)
    }

    fn policy() -> TierPolicy {
        TierPolicy {
            senior: role(SENIOR),
            junior: role(JUNIOR),
            prerequisite: None,
            promotion_threshold: 5,
            senior_capacity: None,
        }
    }

    fn roles(ids: &[u64]) -> HashSet<serenity::RoleId> {
        ids.iter().copied().map(role).collect()
    }

    #[test]
    fn threshold_boundary() {
        assert_eq!(decide(4, &roles(&[]), &policy(), 0), RoleMutation::Grant(role(JUNIOR)));
        assert_eq!(decide(5, &roles(&[JUNIOR]), &policy(), 0), RoleMutation::Grant(role(SENIOR)));
    }

    #[test]
    fn full_senior_tier_keeps_member_junior() {
        let policy = TierPolicy {
            senior_capacity: Some(10),
            ..policy()
        };
        assert_eq!(decide(5, &roles(&[JUNIOR]), &policy, 10), RoleMutation::None);
        assert_eq!(decide(5, &roles(&[JUNIOR]), &policy, 9), RoleMutation::Grant(role(SENIOR)));
    }

    #[test]
    fn prerequisite_gates_promotion() {
        let policy = TierPolicy {
            prerequisite: Some(role(VERIFIED)),
            ..policy()
        };
        assert_eq!(decide(7, &roles(&[JUNIOR]), &policy, 0), RoleMutation::None);
        assert_eq!(
            decide(7, &roles(&[JUNIOR, VERIFIED]), &policy, 0),
            RoleMutation::Grant(role(SENIOR))
        );
    }

    #[test]
    fn held_roles_produce_no_mutation() {
        assert_eq!(decide(2, &roles(&[JUNIOR]), &policy(), 0), RoleMutation::None);
        assert_eq!(decide(9, &roles(&[SENIOR]), &policy(), 0), RoleMutation::None);
    }

    fn service() -> RoleService {
        RoleService::new(
            Arc::new(test_config()),
            Arc::new(LocalizationManager::new("en-US")),
        )
    }

    fn guild() -> FakePlatform {
        FakePlatform::new()
            .with_role(SENIOR, "OG", 5)
            .with_role(JUNIOR, "Borker", 4)
    }

    #[tokio::test]
    async fn promotion_is_announced_once() {
        let platform = guild();
        platform.add_member(7, &[JUNIOR]);
        let service = service();

        let mutation = service
            .apply_referral_tier(&platform, serenity::UserId::new(7), 5)
            .await
            .unwrap();
        assert_eq!(mutation, RoleMutation::Grant(role(SENIOR)));
        assert!(platform.has_role(7, SENIOR));

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, serenity::ChannelId::new(200));
        assert_eq!(
            sent[0].1,
            "<@7> has earned the OG role for inviting 5 or more members!"
        );

        // Re-deriving from the same count changes nothing
        let again = service
            .apply_referral_tier(&platform, serenity::UserId::new(7), 5)
            .await
            .unwrap();
        assert_eq!(again, RoleMutation::None);
        assert_eq!(platform.sent().len(), 1);
        assert_eq!(platform.role_changes().len(), 1);
    }

    #[tokio::test]
    async fn junior_grant_is_silent() {
        let platform = guild();
        platform.add_member(8, &[]);

        service()
            .apply_referral_tier(&platform, serenity::UserId::new(8), 1)
            .await
            .unwrap();

        assert_eq!(
            platform.role_changes(),
            vec![RoleChange::Granted(serenity::UserId::new(8), role(JUNIOR))]
        );
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn roles_above_the_bot_are_refused() {
        let platform = guild();
        platform.set_bot_top_position(5);
        platform.add_member(7, &[JUNIOR]);

        let err = service()
            .apply_referral_tier(&platform, serenity::UserId::new(7), 6)
            .await
            .unwrap_err();

        assert!(matches!(err, AutomationError::ConfigurationError { .. }));
        assert!(platform.role_changes().is_empty());
    }

    #[tokio::test]
    async fn missing_tier_role_is_not_found() {
        let platform = FakePlatform::new().with_role(SENIOR, "OG", 5);
        platform.add_member(7, &[]);

        let err = service()
            .apply_referral_tier(&platform, serenity::UserId::new(7), 1)
            .await
            .unwrap_err();

        assert!(matches!(err, AutomationError::NotFound { kind: "role", .. }));
    }
}
