use crate::config::{BotConfig, RoleRef};
use crate::modules::invite_tracking::AttributionEngine;
use crate::services::errors::AutomationError;
use crate::services::platform::GuildPlatform;
use tracing::{info, warn};

/// Checks that must pass before the bot is useful. Failing to resolve the guild
/// or read its invites is fatal; misconfigured roles are only reported, since
/// every later mutation re-checks them.
pub async fn preflight(
    platform: &dyn GuildPlatform,
    config: &BotConfig,
    attribution: &AttributionEngine,
) -> Result<(), AutomationError> {
    let guild_id = config.guild_id;
    let profile = platform.guild_profile(guild_id).await?;
    info!("Managing guild {} ({})", profile.name, guild_id);

    attribution.prime(platform, guild_id).await?;

    let hierarchy = platform.role_hierarchy(guild_id).await?;
    if let Some(prerequisite) = &config.tiers.senior_prerequisite {
        // Only read, never granted
        if let Err(e) = hierarchy.resolve(prerequisite) {
            warn!("{}", e);
        }
    }

    for role in managed_roles(config) {
        let check = hierarchy
            .resolve(role)
            .and_then(|id| hierarchy.ensure_manageable(id));
        if let Err(e) = check {
            warn!("Role {} cannot be managed: {}", role, e);
        }
    }

    Ok(())
}

/// Every role the bot grants or revokes, each listed once.
fn managed_roles(config: &BotConfig) -> Vec<&RoleRef> {
    let mut managed = vec![
        &config.tiers.senior,
        &config.tiers.junior,
        &config.activity.engaged_role,
        &config.activity.demoted_role,
    ];
    managed.sort_by_key(|role| role.to_string());
    managed.dedup();
    managed
}
