use crate::services::errors::AutomationError;
use crate::services::platform::{GuildPlatform, InviteUsage};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// How a member got into the guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinAttribution {
    Normal {
        inviter_id: Option<serenity::UserId>,
        code: String,
    },
    Vanity,
    PermissionsDenied,
    Unknown,
}

impl JoinAttribution {
    pub fn kind(&self) -> &'static str {
        match self {
            JoinAttribution::Normal { .. } => "normal",
            JoinAttribution::Vanity => "vanity",
            JoinAttribution::PermissionsDenied => "permissions_denied",
            JoinAttribution::Unknown => "unknown",
        }
    }
}

/// Last observed `code -> uses` map. Only ever replaced as a whole.
#[derive(Default)]
pub struct InviteSnapshotStore {
    uses: RwLock<HashMap<String, u64>>,
}

impl InviteSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self) -> HashMap<String, u64> {
        self.uses.read().await.clone()
    }

    pub async fn replace(&self, live: &[InviteUsage]) {
        *self.uses.write().await = usage_map(live);
    }

    pub async fn len(&self) -> usize {
        self.uses.read().await.len()
    }
}

fn usage_map(live: &[InviteUsage]) -> HashMap<String, u64> {
    live.iter()
        .map(|invite| (invite.code.clone(), invite.uses))
        .collect()
}

/// Outcome of diffing live invite usage against the snapshot.
#[derive(Debug, PartialEq, Eq)]
pub enum InviteDiff<'a> {
    None,
    Single(&'a InviteUsage),
    Ambiguous(usize),
}

/// Codes present in both lists whose live usage strictly exceeds the snapshot.
/// Codes the snapshot has never seen are not candidates.
pub fn find_used_invite<'a>(
    live: &'a [InviteUsage],
    snapshot: &HashMap<String, u64>,
) -> InviteDiff<'a> {
    let mut increased = live.iter().filter(|invite| {
        snapshot
            .get(&invite.code)
            .is_some_and(|&old_uses| invite.uses > old_uses)
    });

    match (increased.next(), increased.count()) {
        (None, _) => InviteDiff::None,
        (Some(invite), 0) => InviteDiff::Single(invite),
        (Some(_), rest) => InviteDiff::Ambiguous(rest + 1),
    }
}

/// Works out which invite a joining member used.
pub struct AttributionEngine {
    snapshot: InviteSnapshotStore,
}

impl AttributionEngine {
    pub fn new() -> Self {
        Self {
            snapshot: InviteSnapshotStore::new(),
        }
    }

    pub fn snapshot(&self) -> &InviteSnapshotStore {
        &self.snapshot
    }

    /// Loads the initial snapshot. A permission failure here is fatal to the caller.
    pub async fn prime(
        &self,
        platform: &dyn GuildPlatform,
        guild_id: serenity::GuildId,
    ) -> Result<usize, AutomationError> {
        let live = platform.fetch_invites(guild_id).await?;
        self.snapshot.replace(&live).await;
        info!("Primed invite snapshot with {} codes for guild {}", live.len(), guild_id);
        Ok(live.len())
    }

    /// Classifies one join. On a fetch failure the snapshot is left as it was.
    pub async fn attribute(
        &self,
        platform: &dyn GuildPlatform,
        guild_id: serenity::GuildId,
    ) -> Result<JoinAttribution, AutomationError> {
        // Held across fetch, diff and replace: passes are serialized, so an older
        // fetch can never overwrite a newer snapshot.
        let mut stored = self.snapshot.uses.write().await;

        let live = match platform.fetch_invites(guild_id).await {
            Ok(live) => live,
            Err(AutomationError::PermissionDenied(reason)) => {
                warn!("Cannot read invites for guild {}: {}", guild_id, reason);
                return Ok(JoinAttribution::PermissionsDenied);
            }
            Err(e) => {
                return Err(AutomationError::TransientFetchFailure(e.to_string()));
            }
        };

        let diff = match find_used_invite(&live, &stored) {
            InviteDiff::Single(invite) => Some(JoinAttribution::Normal {
                inviter_id: invite.inviter_id,
                code: invite.code.clone(),
            }),
            InviteDiff::Ambiguous(n) => {
                debug!("{} invite codes advanced at once in guild {}", n, guild_id);
                Some(JoinAttribution::Unknown)
            }
            InviteDiff::None => None,
        };
        *stored = usage_map(&live);
        drop(stored);

        if let Some(attribution) = diff {
            return Ok(attribution);
        }

        match platform.guild_profile(guild_id).await {
            Ok(profile) if profile.vanity_code.is_some() => Ok(JoinAttribution::Vanity),
            Ok(_) => Ok(JoinAttribution::Unknown),
            Err(e) => {
                warn!("Could not check vanity URL for guild {}: {}", guild_id, e);
                Ok(JoinAttribution::Unknown)
            }
        }
    }
}
