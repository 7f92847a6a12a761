//! In-memory guild used by the engine tests.

use super::{
    GuildPlatform, GuildProfile, GuildRole, InviteUsage, PlatformMessage, RoleHierarchy,
};
use crate::services::errors::AutomationError;
use poise::serenity_prelude as serenity;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub const BOT_ID: u64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteFailure {
    Forbidden,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleChange {
    Granted(serenity::UserId, serenity::RoleId),
    Revoked(serenity::UserId, serenity::RoleId),
}

#[derive(Default)]
struct State {
    invites: Vec<InviteUsage>,
    queued_invites: VecDeque<(Vec<InviteUsage>, Duration)>,
    invite_failure: Option<InviteFailure>,
    vanity_code: Option<String>,
    roles: Vec<GuildRole>,
    bot_top_position: u16,
    members: HashMap<serenity::UserId, HashSet<serenity::RoleId>>,
    role_changes: Vec<RoleChange>,
    sent: Vec<(serenity::ChannelId, String)>,
    reactions: Vec<(serenity::MessageId, String)>,
    messages: HashMap<serenity::MessageId, PlatformMessage>,
    deleted: Vec<serenity::MessageId>,
    next_message_id: u64,
}

pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                bot_top_position: 100,
                next_message_id: 10_000,
                ..Default::default()
            }),
        }
    }

    pub fn with_role(self, id: u64, name: &str, position: u16) -> Self {
        self.state.lock().unwrap().roles.push(GuildRole {
            id: serenity::RoleId::new(id),
            name: name.to_string(),
            position,
            managed: false,
        });
        self
    }

    pub fn set_bot_top_position(&self, position: u16) {
        self.state.lock().unwrap().bot_top_position = position;
    }

    pub fn set_invites(&self, invites: &[(&str, u64, Option<u64>)]) {
        self.state.lock().unwrap().invites = usages(invites);
    }

    /// One-shot response for the next invite fetch, returned after `delay`.
    pub fn queue_invites(&self, invites: &[(&str, u64, Option<u64>)], delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .queued_invites
            .push_back((usages(invites), delay));
    }

    pub fn fail_invites(&self, failure: Option<InviteFailure>) {
        self.state.lock().unwrap().invite_failure = failure;
    }

    pub fn set_vanity(&self, code: Option<&str>) {
        self.state.lock().unwrap().vanity_code = code.map(str::to_string);
    }

    pub fn add_member(&self, user: u64, roles: &[u64]) {
        self.state.lock().unwrap().members.insert(
            serenity::UserId::new(user),
            roles.iter().copied().map(serenity::RoleId::new).collect(),
        );
    }

    pub fn has_role(&self, user: u64, role: u64) -> bool {
        self.state
            .lock()
            .unwrap()
            .members
            .get(&serenity::UserId::new(user))
            .is_some_and(|roles| roles.contains(&serenity::RoleId::new(role)))
    }

    pub fn role_changes(&self) -> Vec<RoleChange> {
        self.state.lock().unwrap().role_changes.clone()
    }

    pub fn sent(&self) -> Vec<(serenity::ChannelId, String)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn reactions(&self) -> Vec<(serenity::MessageId, String)> {
        self.state.lock().unwrap().reactions.clone()
    }

    pub fn deleted(&self) -> Vec<serenity::MessageId> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn put_message(&self, message: PlatformMessage) {
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(message.id, message);
    }
}

fn usages(invites: &[(&str, u64, Option<u64>)]) -> Vec<InviteUsage> {
    invites
        .iter()
        .map(|(code, uses, inviter)| InviteUsage {
            code: code.to_string(),
            uses: *uses,
            inviter_id: inviter.map(serenity::UserId::new),
        })
        .collect()
}

#[async_trait::async_trait]
impl GuildPlatform for FakePlatform {
    fn bot_id(&self) -> serenity::UserId {
        serenity::UserId::new(BOT_ID)
    }

    async fn guild_profile(
        &self,
        _guild_id: serenity::GuildId,
    ) -> Result<GuildProfile, AutomationError> {
        Ok(GuildProfile {
            name: "Test Guild".into(),
            vanity_code: self.state.lock().unwrap().vanity_code.clone(),
        })
    }

    async fn fetch_invites(
        &self,
        _guild_id: serenity::GuildId,
    ) -> Result<Vec<InviteUsage>, AutomationError> {
        let queued = {
            let mut state = self.state.lock().unwrap();
            match state.invite_failure {
                Some(InviteFailure::Forbidden) => {
                    return Err(AutomationError::PermissionDenied("Missing Permissions".into()));
                }
                Some(InviteFailure::Network) => {
                    return Err(AutomationError::TransientFetchFailure("connection reset".into()));
                }
                None => {}
            }
            match state.queued_invites.pop_front() {
                Some(queued) => queued,
                None => return Ok(state.invites.clone()),
            }
        };

        let (invites, delay) = queued;
        tokio::time::sleep(delay).await;
        Ok(invites)
    }

    async fn role_hierarchy(
        &self,
        _guild_id: serenity::GuildId,
    ) -> Result<RoleHierarchy, AutomationError> {
        let state = self.state.lock().unwrap();
        Ok(RoleHierarchy {
            roles: state.roles.clone(),
            bot_top_position: state.bot_top_position,
        })
    }

    async fn member_roles(
        &self,
        _guild_id: serenity::GuildId,
        user_id: serenity::UserId,
    ) -> Result<HashSet<serenity::RoleId>, AutomationError> {
        self.state
            .lock()
            .unwrap()
            .members
            .get(&user_id)
            .cloned()
            .ok_or(AutomationError::NotFound {
                kind: "member",
                name: user_id.to_string(),
            })
    }

    async fn role_members(
        &self,
        _guild_id: serenity::GuildId,
        role_id: serenity::RoleId,
    ) -> Result<Vec<serenity::UserId>, AutomationError> {
        let state = self.state.lock().unwrap();
        let mut holders: Vec<_> = state
            .members
            .iter()
            .filter(|(_, roles)| roles.contains(&role_id))
            .map(|(id, _)| *id)
            .collect();
        holders.sort();
        Ok(holders)
    }

    async fn grant_role(
        &self,
        _guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        role_id: serenity::RoleId,
        _reason: &str,
    ) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.members.entry(user_id).or_default().insert(role_id);
        state.role_changes.push(RoleChange::Granted(user_id, role_id));
        Ok(())
    }

    async fn revoke_role(
        &self,
        _guild_id: serenity::GuildId,
        user_id: serenity::UserId,
        role_id: serenity::RoleId,
        _reason: &str,
    ) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        if let Some(roles) = state.members.get_mut(&user_id) {
            roles.remove(&role_id);
        }
        state.role_changes.push(RoleChange::Revoked(user_id, role_id));
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: serenity::ChannelId,
        content: &str,
    ) -> Result<serenity::MessageId, AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push((channel_id, content.to_string()));
        state.next_message_id += 1;
        Ok(serenity::MessageId::new(state.next_message_id))
    }

    async fn react(
        &self,
        _channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
        emoji: &str,
    ) -> Result<(), AutomationError> {
        self.state
            .lock()
            .unwrap()
            .reactions
            .push((message_id, emoji.to_string()));
        Ok(())
    }

    async fn fetch_message(
        &self,
        _channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Result<PlatformMessage, AutomationError> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(&message_id)
            .cloned()
            .ok_or(AutomationError::NotFound {
                kind: "message",
                name: message_id.to_string(),
            })
    }

    async fn delete_message(
        &self,
        _channel_id: serenity::ChannelId,
        message_id: serenity::MessageId,
    ) -> Result<(), AutomationError> {
        let mut state = self.state.lock().unwrap();
        state.messages.remove(&message_id);
        state.deleted.push(message_id);
        Ok(())
    }
}
