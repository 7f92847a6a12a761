use super::ledger::{ReferralLedger, Removal};
use super::tracking::{AttributionEngine, JoinAttribution};
use crate::config::BotConfig;
use crate::services::errors::AutomationError;
use crate::services::platform::GuildPlatform;
use crate::services::role_policy::RoleService;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipEvent {
    Joined {
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        is_bot: bool,
    },
    Left {
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        is_bot: bool,
    },
}

/// Turns joins and leaves into ledger writes and tier updates.
pub struct ReferralTracker {
    config: Arc<BotConfig>,
    platform: Arc<dyn GuildPlatform>,
    attribution: Arc<AttributionEngine>,
    ledger: Arc<ReferralLedger>,
    roles: Arc<RoleService>,
}

impl ReferralTracker {
    pub fn new(
        config: Arc<BotConfig>,
        platform: Arc<dyn GuildPlatform>,
        attribution: Arc<AttributionEngine>,
        ledger: Arc<ReferralLedger>,
        roles: Arc<RoleService>,
    ) -> Self {
        Self {
            config,
            platform,
            attribution,
            ledger,
            roles,
        }
    }

    fn is_tracked(&self, guild_id: serenity::GuildId, is_bot: bool) -> bool {
        guild_id == self.config.guild_id && !(self.config.ignore_bots && is_bot)
    }

    /// Returns the inviter's new count when the join was credited.
    pub async fn handle_join(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        is_bot: bool,
    ) -> Result<Option<i32>, AutomationError> {
        if !self.is_tracked(guild_id, is_bot) {
            return Ok(None);
        }

        let attribution = self
            .attribution
            .attribute(self.platform.as_ref(), guild_id)
            .await?;

        info!(
            "Member {} joined guild {} ({})",
            user_id,
            guild_id,
            attribution.kind()
        );

        let JoinAttribution::Normal {
            inviter_id: Some(inviter_id),
            code,
        } = attribution
        else {
            return Ok(None);
        };

        if inviter_id == user_id {
            debug!("Member {} rejoined through their own invite {}", inviter_id, code);
            return Ok(None);
        }

        let Some(count) = self.ledger.record_referral(inviter_id, user_id).await? else {
            return Ok(None);
        };

        info!(
            "Credited {} with a referral via {} (now {})",
            inviter_id, code, count
        );

        self.roles
            .apply_referral_tier(self.platform.as_ref(), inviter_id, count)
            .await?;

        Ok(Some(count))
    }

    pub async fn handle_leave(
        &self,
        guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        is_bot: bool,
    ) -> Result<Option<Removal>, AutomationError> {
        if !self.is_tracked(guild_id, is_bot) {
            return Ok(None);
        }

        let removal = self.ledger.remove_referral(user_id).await?;
        if let Some(removal) = removal {
            info!(
                "Member {} left guild {}, debited {} (now {})",
                user_id, guild_id, removal.inviter_id, removal.count
            );
        }

        Ok(removal)
    }

    pub async fn handle(&self, event: MembershipEvent) -> Result<(), AutomationError> {
        match event {
            MembershipEvent::Joined {
                guild_id,
                user_id,
                is_bot,
            } => self.handle_join(guild_id, user_id, is_bot).await.map(drop),
            MembershipEvent::Left {
                guild_id,
                user_id,
                is_bot,
            } => self.handle_leave(guild_id, user_id, is_bot).await.map(drop),
        }
    }
}

enum QueueItem {
    Event(MembershipEvent),
    #[cfg(test)]
    Barrier(tokio::sync::oneshot::Sender<()>),
}

/// Joins and leaves drained one at a time by a single task, in gateway order.
#[derive(Clone)]
pub struct MembershipQueue {
    tx: mpsc::UnboundedSender<QueueItem>,
}

impl MembershipQueue {
    pub fn spawn(tracker: Arc<ReferralTracker>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    QueueItem::Event(event) => {
                        if let Err(e) = tracker.handle(event).await {
                            error!("Failed to process {:?}: {}", event, e);
                        }
                    }
                    #[cfg(test)]
                    QueueItem::Barrier(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Membership queue closed");
        });

        Self { tx }
    }

    pub fn push(&self, event: MembershipEvent) -> anyhow::Result<()> {
        self.tx
            .send(QueueItem::Event(event))
            .map_err(|_| anyhow::anyhow!("membership queue is closed"))
    }

    /// Resolves once every event pushed before it has been processed.
    #[cfg(test)]
    pub async fn settle(&self) {
        let (done, wait) = tokio::sync::oneshot::channel();
        self.tx.send(QueueItem::Barrier(done)).unwrap();
        wait.await.unwrap();
    }
}
