use crate::config::BotConfig;
use crate::services::errors::AutomationError;
use crate::services::localization::LocalizationManager;
use crate::services::platform::{GuildPlatform, RoleHierarchy};
use crate::services::role_policy::{RoleMutation, RoleService};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use fluent::FluentArgs;
use poise::serenity_prelude as serenity;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Members are re-checked in batches of this size before yielding to other tasks.
const SWEEP_BATCH: usize = 25;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where a member stands relative to the inactivity threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decay {
    Active,
    /// No message seen yet; the clock starts now.
    Untracked,
    Expired,
}

pub fn evaluate(
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Decay {
    match last_seen {
        None => Decay::Untracked,
        Some(at) if now - at > threshold => Decay::Expired,
        Some(_) => Decay::Active,
    }
}

/// Roles a demotion touches, resolved once per sweep.
#[derive(Debug, Clone, Copy)]
struct DemotionRoles {
    engaged: serenity::RoleId,
    demoted: serenity::RoleId,
    junior: Option<serenity::RoleId>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub seeded: usize,
    pub demoted: Vec<serenity::UserId>,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    Completed(SweepReport),
    /// Another sweep was still running.
    Skipped,
}

/// Last-message timestamps and the periodic demotion sweep over them.
pub struct ActivityTracker {
    pub(super) config: Arc<BotConfig>,
    l10n: Arc<LocalizationManager>,
    clock: Arc<dyn Clock>,
    last_seen: DashMap<serenity::UserId, DateTime<Utc>>,
    sweep_guard: tokio::sync::Mutex<()>,
    pub(super) runner: Mutex<Option<JoinHandle<()>>>,
}

impl ActivityTracker {
    pub fn new(
        config: Arc<BotConfig>,
        l10n: Arc<LocalizationManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            l10n,
            clock,
            last_seen: DashMap::new(),
            sweep_guard: tokio::sync::Mutex::new(()),
            runner: Mutex::new(None),
        }
    }

    pub fn touch(&self, user_id: serenity::UserId) {
        self.last_seen.insert(user_id, self.clock.now());
    }

    pub fn last_seen(&self, user_id: serenity::UserId) -> Option<DateTime<Utc>> {
        self.last_seen.get(&user_id).map(|at| *at)
    }

    pub fn forget(&self, user_id: serenity::UserId) {
        self.last_seen.remove(&user_id);
    }

    /// Demotes every engaged member whose last message is older than the threshold.
    pub async fn sweep(
        &self,
        platform: &dyn GuildPlatform,
        roles: &RoleService,
    ) -> Result<SweepOutcome, AutomationError> {
        let Ok(_guard) = self.sweep_guard.try_lock() else {
            debug!("Inactivity sweep already running, skipping this tick");
            return Ok(SweepOutcome::Skipped);
        };

        let settings = &self.config.activity;
        let guild_id = self.config.guild_id;

        let hierarchy = platform.role_hierarchy(guild_id).await?;
        let engaged = hierarchy.resolve(&settings.engaged_role)?;
        let demoted = hierarchy.resolve(&settings.demoted_role)?;
        hierarchy.ensure_manageable(engaged)?;
        hierarchy.ensure_manageable(demoted)?;
        let junior = if settings.grant_junior_on_demotion {
            let junior = hierarchy.resolve(&self.config.tiers.junior)?;
            hierarchy.ensure_manageable(junior)?;
            Some(junior)
        } else {
            None
        };
        let targets = DemotionRoles {
            engaged,
            demoted,
            junior,
        };

        let holders = platform.role_members(guild_id, engaged).await?;
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for (idx, user_id) in holders.into_iter().enumerate() {
            if idx > 0 && idx % SWEEP_BATCH == 0 {
                tokio::task::yield_now().await;
            }
            report.checked += 1;

            match evaluate(self.last_seen(user_id), now, settings.inactivity_threshold) {
                Decay::Active => continue,
                Decay::Untracked => {
                    self.last_seen.entry(user_id).or_insert(now);
                    report.seeded += 1;
                    continue;
                }
                Decay::Expired => {}
            }

            match self.demote(platform, roles, &hierarchy, user_id, targets).await {
                Ok(true) => report.demoted.push(user_id),
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to demote inactive member {}: {}", user_id, e);
                }
            }
        }

        info!(
            "Inactivity sweep checked {} members, demoted {}, seeded {}",
            report.checked,
            report.demoted.len(),
            report.seeded
        );

        Ok(SweepOutcome::Completed(report))
    }

    async fn demote(
        &self,
        platform: &dyn GuildPlatform,
        roles: &RoleService,
        hierarchy: &RoleHierarchy,
        user_id: serenity::UserId,
        targets: DemotionRoles,
    ) -> Result<bool, AutomationError> {
        let DemotionRoles {
            engaged,
            demoted,
            junior,
        } = targets;
        let mut current = platform.member_roles(self.config.guild_id, user_id).await?;
        if !current.contains(&engaged) {
            return Ok(false);
        }

        let reason = self.l10n.t("activity-reason-demoted", None);
        roles
            .apply(platform, hierarchy, user_id, &mut current, RoleMutation::Revoke(engaged), &reason)
            .await?;
        roles
            .apply(platform, hierarchy, user_id, &mut current, RoleMutation::Grant(demoted), &reason)
            .await?;
        if let Some(junior) = junior {
            roles
                .apply(platform, hierarchy, user_id, &mut current, RoleMutation::Grant(junior), &reason)
                .await?;
        }

        // A reinstated member starts a fresh inactivity window
        self.forget(user_id);
        info!("Demoted inactive member {}", user_id);

        let role_name = hierarchy
            .roles
            .iter()
            .find(|r| r.id == demoted)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| demoted.to_string());

        let mut args = FluentArgs::new();
        args.set("user", format!("<@{}>", user_id));
        args.set("period", format_period(self.config.activity.inactivity_threshold));
        args.set("role", role_name);
        args.set("emoji", self.config.appeal.emoji.clone());
        let text = self.l10n.t("activity-demoted", Some(&args));

        let channel_id = self.config.appeal_channel_id;
        match platform.send_message(channel_id, &text).await {
            Ok(message_id) => {
                if let Err(e) = platform
                    .react(channel_id, message_id, &self.config.appeal.emoji)
                    .await
                {
                    warn!("Failed to seed appeal vote for {}: {}", user_id, e);
                }
            }
            Err(e) => warn!("Failed to post appeal notice for {}: {}", user_id, e),
        }

        Ok(true)
    }
}

pub fn format_period(period: Duration) -> String {
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("{} {}", n, unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };

    if period.num_days() > 0 && period == Duration::days(period.num_days()) {
        plural(period.num_days(), "day")
    } else if period.num_hours() > 0 && period == Duration::hours(period.num_hours()) {
        plural(period.num_hours(), "hour")
    } else {
        plural(period.num_minutes().max(1), "minute")
    }
}

#[cfg(test)]
pub mod testing {
    use super::Clock;
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;

    pub struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self(Mutex::new(start))
        }

        pub fn advance(&self, by: Duration) {
            *self.0.lock().unwrap() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }
}
