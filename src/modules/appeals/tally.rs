use crate::config::BotConfig;
use crate::services::errors::AutomationError;
use crate::services::localization::LocalizationManager;
use crate::services::platform::{GuildPlatform, PlatformMessage, ReactionCount, RoleHierarchy};
use crate::services::role_policy::{RoleMutation, RoleService};
use dashmap::DashMap;
use fluent::FluentArgs;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Restoration tier reached by an appeal, ordered worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AppealOutcome {
    Demoted,
    Provisional,
    Reinstated,
}

pub fn outcome(votes: u64, low_tier: u64, high_tier: u64) -> AppealOutcome {
    if votes >= high_tier {
        AppealOutcome::Reinstated
    } else if votes >= low_tier {
        AppealOutcome::Provisional
    } else {
        AppealOutcome::Demoted
    }
}

/// Drops skin-tone modifiers and the emoji presentation selector so every
/// variant of one emoji lands in the same vote pool.
pub fn normalize_emoji(emoji: &str) -> String {
    emoji
        .chars()
        .filter(|c| !matches!(*c as u32, 0x1F3FB..=0x1F3FF | 0xFE0F))
        .collect()
}

/// Affirmative votes, not counting the bot's own seed reactions.
pub fn count_votes(reactions: &[ReactionCount], emoji: &str) -> u64 {
    let target = normalize_emoji(emoji);

    reactions
        .iter()
        .filter(|r| normalize_emoji(&r.emoji) == target)
        .map(|r| r.count.saturating_sub(u64::from(r.me)))
        .sum()
}

/// The member an appeal message is about. The bot's own demotion notices name
/// the member in their first mention.
pub fn appeal_subject(
    message: &PlatformMessage,
    bot_id: serenity::UserId,
) -> Option<serenity::UserId> {
    if message.author_id == bot_id {
        message.mentions.first().copied()
    } else {
        Some(message.author_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TallyResult {
    Ignored,
    Unchanged(AppealOutcome),
    Applied {
        subject: serenity::UserId,
        outcome: AppealOutcome,
        votes: u64,
        roles_changed: bool,
    },
}

pub struct AppealTallier {
    config: Arc<BotConfig>,
    l10n: Arc<LocalizationManager>,
    outcomes: DashMap<serenity::MessageId, AppealOutcome>,
    tally_lock: tokio::sync::Mutex<()>,
}

impl AppealTallier {
    pub fn new(config: Arc<BotConfig>, l10n: Arc<LocalizationManager>) -> Self {
        Self {
            config,
            l10n,
            outcomes: DashMap::new(),
            tally_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn last_outcome(&self, message_id: serenity::MessageId) -> Option<AppealOutcome> {
        self.outcomes.get(&message_id).map(|o| *o)
    }

    /// Recounts the votes on one message and moves its subject to the matching tier.
    pub async fn retally(
        &self,
        platform: &dyn GuildPlatform,
        roles: &RoleService,
        channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Result<TallyResult, AutomationError> {
        if channel_id != self.config.appeal_channel_id {
            return Ok(TallyResult::Ignored);
        }

        // Tallies on different messages are rare enough to serialize outright
        let _guard = self.tally_lock.lock().await;

        let message = match platform.fetch_message(channel_id, message_id).await {
            Ok(message) => message,
            Err(AutomationError::NotFound { .. }) => {
                self.outcomes.remove(&message_id);
                return Ok(TallyResult::Ignored);
            }
            Err(e) => return Err(e),
        };

        let Some(subject) = appeal_subject(&message, platform.bot_id()) else {
            return Ok(TallyResult::Ignored);
        };
        if subject == platform.bot_id() {
            return Ok(TallyResult::Ignored);
        }

        let settings = &self.config.appeal;
        let votes = count_votes(&message.reactions, &settings.emoji);
        let reached = outcome(votes, settings.low_tier, settings.high_tier);
        let previous = self.last_outcome(message_id);

        if previous == Some(reached) {
            return Ok(TallyResult::Unchanged(reached));
        }

        let guild_id = self.config.guild_id;
        let hierarchy = platform.role_hierarchy(guild_id).await?;
        let engaged = hierarchy.resolve(&self.config.activity.engaged_role)?;
        let demoted = hierarchy.resolve(&self.config.activity.demoted_role)?;

        let mut current = match platform.member_roles(guild_id, subject).await {
            Ok(current) => current,
            Err(AutomationError::NotFound { .. }) => {
                debug!("Appeal subject {} is no longer in the guild", subject);
                return Ok(TallyResult::Ignored);
            }
            Err(e) => return Err(e),
        };

        if previous.is_none() {
            if !current.contains(&demoted) {
                return Ok(TallyResult::Ignored);
            }
            if reached == AppealOutcome::Demoted {
                self.outcomes.insert(message_id, reached);
                return Ok(TallyResult::Unchanged(reached));
            }
        }

        let mutations = match reached {
            AppealOutcome::Reinstated => {
                [RoleMutation::Revoke(demoted), RoleMutation::Grant(engaged)]
            }
            AppealOutcome::Provisional => [RoleMutation::Revoke(demoted), RoleMutation::None],
            AppealOutcome::Demoted => [RoleMutation::Grant(demoted), RoleMutation::Revoke(engaged)],
        };

        let reason = self.l10n.t("appeal-reason", None);
        let mut roles_changed = false;
        for mutation in mutations {
            roles_changed |= roles
                .apply(platform, &hierarchy, subject, &mut current, mutation, &reason)
                .await?;
        }

        self.outcomes.insert(message_id, reached);
        info!(
            "Appeal for {} moved from {:?} to {:?} with {} votes",
            subject, previous, reached, votes
        );

        if roles_changed {
            self.notify(platform, &hierarchy, subject, reached, votes, engaged, demoted)
                .await;
        }

        if roles_changed && reached == AppealOutcome::Reinstated && settings.delete_resolved {
            match platform.delete_message(channel_id, message_id).await {
                Ok(()) => {
                    self.outcomes.remove(&message_id);
                }
                Err(e) => warn!("Failed to delete resolved appeal {}: {}", message_id, e),
            }
        }

        Ok(TallyResult::Applied {
            subject,
            outcome: reached,
            votes,
            roles_changed,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn notify(
        &self,
        platform: &dyn GuildPlatform,
        hierarchy: &RoleHierarchy,
        subject: serenity::UserId,
        reached: AppealOutcome,
        votes: u64,
        engaged: serenity::RoleId,
        demoted: serenity::RoleId,
    ) {
        let role_name = |id: serenity::RoleId| {
            hierarchy
                .roles
                .iter()
                .find(|r| r.id == id)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| id.to_string())
        };

        let mut args = FluentArgs::new();
        args.set("user", format!("<@{}>", subject));
        args.set("votes", votes);

        let key = match reached {
            AppealOutcome::Reinstated => {
                args.set("role", role_name(engaged));
                "appeal-reinstated"
            }
            AppealOutcome::Provisional => {
                args.set("role", role_name(engaged));
                args.set("needed", self.config.appeal.high_tier);
                "appeal-provisional"
            }
            AppealOutcome::Demoted => {
                args.set("role", role_name(demoted));
                "appeal-returned"
            }
        };

        let text = self.l10n.t(key, Some(&args));
        if let Err(e) = platform
            .send_message(self.config.appeal_channel_id, &text)
            .await
        {
            warn!("Failed to post appeal result for {}: {}", subject, e);
        }
    }
}
