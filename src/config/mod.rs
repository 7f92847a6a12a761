use anyhow::{Context as _, anyhow, bail};
use poise::serenity_prelude as serenity;
use std::fmt;

pub mod duration;

pub use duration::parse_duration;

/// A role named either by its snowflake (or mention) or by its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRef {
    Id(serenity::RoleId),
    Name(String),
}

impl RoleRef {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("<@&")
            .and_then(|rest| rest.strip_suffix('>'))
            .unwrap_or(trimmed);

        match digits.parse::<u64>() {
            Ok(id) if id > 0 => RoleRef::Id(serenity::RoleId::new(id)),
            _ => RoleRef::Name(trimmed.to_string()),
        }
    }
}

impl fmt::Display for RoleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleRef::Id(id) => write!(f, "{}", id),
            RoleRef::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Roles the referral tiers are built from.
#[derive(Debug, Clone)]
pub struct TierRoleConfig {
    pub senior: RoleRef,
    pub junior: RoleRef,
    pub senior_prerequisite: Option<RoleRef>,
    pub senior_capacity: Option<usize>,
    pub promotion_threshold: i32,
}

#[derive(Debug, Clone)]
pub struct ActivityConfig {
    pub engaged_role: RoleRef,
    pub demoted_role: RoleRef,
    /// Demoted members also fall back to the junior referral tier.
    pub grant_junior_on_demotion: bool,
    pub inactivity_threshold: chrono::Duration,
    pub sweep_interval: chrono::Duration,
}

#[derive(Debug, Clone)]
pub struct AppealConfig {
    pub emoji: String,
    pub low_tier: u64,
    pub high_tier: u64,
    pub delete_resolved: bool,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub guild_id: serenity::GuildId,
    pub general_channel_id: serenity::ChannelId,
    pub appeal_channel_id: serenity::ChannelId,
    pub ignore_bots: bool,
    pub locale: String,
    pub tiers: TierRoleConfig,
    pub activity: ActivityConfig,
    pub appeal: AppealConfig,
}

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let snowflake = |key: &str| -> anyhow::Result<u64> {
            let raw = get(key).ok_or_else(|| anyhow!("{} must be set", key))?;
            let id: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a numeric id", key))?;
            if id == 0 {
                bail!("{} must not be zero", key);
            }
            Ok(id)
        };

        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a non-negative integer", key)),
                None => Ok(default),
            }
        };

        let flag = |key: &str, default: bool| -> anyhow::Result<bool> {
            match get(key).map(|v| v.trim().to_ascii_lowercase()) {
                Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
                Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
                Some(v) => bail!("{} must be a boolean, got {:?}", key, v),
                None => Ok(default),
            }
        };

        let span = |key: &str, default: &str| -> anyhow::Result<chrono::Duration> {
            let raw = get(key).unwrap_or_else(|| default.to_string());
            parse_duration(&raw)
                .ok_or_else(|| anyhow!("{} must look like 3d, 24h or 1h30m, got {:?}", key, raw))
        };

        let role = |key: &str, default: &str| RoleRef::parse(&get(key).unwrap_or_else(|| default.to_string()));

        let promotion_threshold = number("PROMOTION_THRESHOLD", 5)?;
        let promotion_threshold = i32::try_from(promotion_threshold)
            .context("PROMOTION_THRESHOLD is too large")?;

        let senior_capacity = match get("SENIOR_ROLE_CAPACITY") {
            Some(_) => Some(number("SENIOR_ROLE_CAPACITY", 0)? as usize),
            None => None,
        };

        let low_tier = number("APPEAL_LOW_TIER", 3)?;
        let high_tier = number("APPEAL_HIGH_TIER", 5)?;
        if low_tier > high_tier {
            bail!(
                "APPEAL_LOW_TIER ({}) must not exceed APPEAL_HIGH_TIER ({})",
                low_tier,
                high_tier
            );
        }

        Ok(Self {
            guild_id: serenity::GuildId::new(snowflake("GUILD_ID")?),
            general_channel_id: serenity::ChannelId::new(snowflake("GENERAL_CHANNEL_ID")?),
            appeal_channel_id: serenity::ChannelId::new(snowflake("APPEAL_CHANNEL_ID")?),
            ignore_bots: flag("IGNORE_BOTS", true)?,
            locale: get("LOCALE").unwrap_or_else(|| "en-US".to_string()),
            tiers: TierRoleConfig {
                senior: role("SENIOR_ROLE", "OG"),
                junior: role("JUNIOR_ROLE", "Borker"),
                senior_prerequisite: get("SENIOR_PREREQUISITE_ROLE").map(|v| RoleRef::parse(&v)),
                senior_capacity,
                promotion_threshold,
            },
            activity: ActivityConfig {
                engaged_role: role("ENGAGED_ROLE", "Bwoofa"),
                demoted_role: role("DEMOTED_ROLE", "bad borkers"),
                grant_junior_on_demotion: flag("DEMOTION_GRANTS_JUNIOR", true)?,
                inactivity_threshold: span("INACTIVITY_THRESHOLD", "3d")?,
                sweep_interval: span("SWEEP_INTERVAL", "24h")?,
            },
            appeal: AppealConfig {
                emoji: get("APPEAL_EMOJI").unwrap_or_else(|| "👍".to_string()),
                low_tier,
                high_tier,
                delete_resolved: flag("APPEAL_DELETE_RESOLVED", false)?,
            },
        })
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> BotConfig {
    BotConfig::from_lookup(|key| match key {
        "GUILD_ID" => Some("100".into()),
        "GENERAL_CHANNEL_ID" => Some("200".into()),
        "APPEAL_CHANNEL_ID" => Some("300".into()),
        _ => None,
    })
    .expect("test config is valid")
}
