pub mod invite_tracking;
pub mod member_invites;
