use crate::db::entities::{invite_tracking, member_invites};
use crate::services::errors::AutomationError;
use chrono::Utc;
use poise::serenity_prelude as serenity;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use tracing::{debug, warn};

/// Result of removing an invitee from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Removal {
    pub inviter_id: serenity::UserId,
    pub count: i32,
}

/// Durable inviter -> count and member -> inviter records.
pub struct ReferralLedger {
    db: DatabaseConnection,
}

impl ReferralLedger {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Credits `inviter_id` with `invitee_id`. Returns the new count, or `None`
    /// when the invitee was already attributed to someone.
    pub async fn record_referral(
        &self,
        inviter_id: serenity::UserId,
        invitee_id: serenity::UserId,
    ) -> Result<Option<i32>, AutomationError> {
        let inviter = inviter_id.get() as i64;
        let invitee = invitee_id.get() as i64;
        let now = Utc::now();

        let txn = self.db.begin().await?;

        invite_tracking::Entity::insert(invite_tracking::ActiveModel {
            inviter_id: Set(inviter),
            invite_count: Set(0),
            updated_at: Set(now.into()),
        })
        .on_conflict(
            OnConflict::column(invite_tracking::Column::InviterId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        let inserted = member_invites::Entity::insert(member_invites::ActiveModel {
            member_id: Set(invitee),
            inviter_id: Set(inviter),
            invited_at: Set(now.into()),
        })
        .on_conflict(
            OnConflict::column(member_invites::Column::MemberId)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(&txn)
        .await?;

        if inserted == 0 {
            // Dropping the transaction rolls back the inviter row insert
            debug!(
                "Member {} is already attributed, ignoring referral from {}",
                invitee_id, inviter_id
            );
            return Ok(None);
        }

        invite_tracking::Entity::update_many()
            .col_expr(
                invite_tracking::Column::InviteCount,
                Expr::col(invite_tracking::Column::InviteCount).add(1),
            )
            .col_expr(invite_tracking::Column::UpdatedAt, Expr::value(now))
            .filter(invite_tracking::Column::InviterId.eq(inviter))
            .exec(&txn)
            .await?;

        let count = current_count(&txn, inviter).await?;
        txn.commit().await?;

        Ok(Some(count))
    }

    /// Removes the attribution of `invitee_id` and debits its inviter.
    /// Returns `None` when the member was never attributed.
    pub async fn remove_referral(
        &self,
        invitee_id: serenity::UserId,
    ) -> Result<Option<Removal>, AutomationError> {
        let invitee = invitee_id.get() as i64;
        let txn = self.db.begin().await?;

        let Some(record) = member_invites::Entity::find_by_id(invitee).one(&txn).await? else {
            return Ok(None);
        };

        let deleted = member_invites::Entity::delete_by_id(invitee)
            .exec(&txn)
            .await?
            .rows_affected;
        if deleted == 0 {
            // A concurrent leave got here first
            return Ok(None);
        }

        let decremented = invite_tracking::Entity::update_many()
            .col_expr(
                invite_tracking::Column::InviteCount,
                Expr::col(invite_tracking::Column::InviteCount).sub(1),
            )
            .col_expr(invite_tracking::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(invite_tracking::Column::InviterId.eq(record.inviter_id))
            .filter(invite_tracking::Column::InviteCount.gt(0))
            .exec(&txn)
            .await?
            .rows_affected;

        if decremented == 0 {
            let violation = AutomationError::InvariantViolation(format!(
                "count of inviter {} would drop below zero",
                record.inviter_id
            ));
            warn!("{}, clamping at 0", violation);
        }

        let count = current_count(&txn, record.inviter_id).await?;
        txn.commit().await?;

        Ok(Some(Removal {
            inviter_id: serenity::UserId::new(record.inviter_id as u64),
            count,
        }))
    }

    pub async fn referral_count(&self, inviter_id: serenity::UserId) -> Result<i32, AutomationError> {
        current_count(&self.db, inviter_id.get() as i64).await
    }

    pub async fn inviter_of(
        &self,
        member_id: serenity::UserId,
    ) -> Result<Option<serenity::UserId>, AutomationError> {
        let record = member_invites::Entity::find_by_id(member_id.get() as i64)
            .one(&self.db)
            .await?;

        Ok(record.map(|r| serenity::UserId::new(r.inviter_id as u64)))
    }

    pub async fn invitees_of(
        &self,
        inviter_id: serenity::UserId,
    ) -> Result<Vec<serenity::UserId>, AutomationError> {
        let records = member_invites::Entity::find()
            .filter(member_invites::Column::InviterId.eq(inviter_id.get() as i64))
            .order_by_asc(member_invites::Column::InvitedAt)
            .all(&self.db)
            .await?;

        Ok(records
            .into_iter()
            .map(|r| serenity::UserId::new(r.member_id as u64))
            .collect())
    }

    pub async fn top_inviters(
        &self,
        limit: u64,
    ) -> Result<Vec<(serenity::UserId, i32)>, AutomationError> {
        let records = invite_tracking::Entity::find()
            .filter(invite_tracking::Column::InviteCount.gt(0))
            .order_by_desc(invite_tracking::Column::InviteCount)
            .order_by_asc(invite_tracking::Column::InviterId)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(records
            .into_iter()
            .map(|r| (serenity::UserId::new(r.inviter_id as u64), r.invite_count))
            .collect())
    }
}

async fn current_count<C: ConnectionTrait>(conn: &C, inviter: i64) -> Result<i32, AutomationError> {
    let record = invite_tracking::Entity::find_by_id(inviter).one(conn).await?;
    Ok(record.map(|r| r.invite_count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_connection;

    fn user(id: u64) -> serenity::UserId {
        serenity::UserId::new(id)
    }

    async fn ledger() -> ReferralLedger {
        ReferralLedger::new(test_connection().await)
    }

    #[tokio::test]
    async fn first_referral_creates_the_record() {
        let ledger = ledger().await;
        assert_eq!(ledger.referral_count(user(1)).await.unwrap(), 0);

        assert_eq!(ledger.record_referral(user(1), user(10)).await.unwrap(), Some(1));
        assert_eq!(ledger.record_referral(user(1), user(11)).await.unwrap(), Some(2));
        assert_eq!(ledger.referral_count(user(1)).await.unwrap(), 2);
        assert_eq!(ledger.inviter_of(user(11)).await.unwrap(), Some(user(1)));
    }

    #[tokio::test]
    async fn recording_the_same_invitee_twice_is_idempotent() {
        let ledger = ledger().await;

        assert_eq!(ledger.record_referral(user(1), user(10)).await.unwrap(), Some(1));
        assert_eq!(ledger.record_referral(user(1), user(10)).await.unwrap(), None);
        // A different inviter cannot claim an attributed member either
        assert_eq!(ledger.record_referral(user(2), user(10)).await.unwrap(), None);

        assert_eq!(ledger.referral_count(user(1)).await.unwrap(), 1);
        assert_eq!(ledger.referral_count(user(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn join_then_leave_conserves_the_count() {
        let ledger = ledger().await;
        ledger.record_referral(user(1), user(10)).await.unwrap();
        let before = ledger.referral_count(user(1)).await.unwrap();

        for _ in 0..3 {
            ledger.record_referral(user(1), user(20)).await.unwrap();
            let removal = ledger.remove_referral(user(20)).await.unwrap();
            assert_eq!(
                removal,
                Some(Removal {
                    inviter_id: user(1),
                    count: before,
                })
            );
        }

        assert_eq!(ledger.referral_count(user(1)).await.unwrap(), before);
        assert_eq!(ledger.inviter_of(user(20)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn leave_of_unattributed_member_is_none() {
        let ledger = ledger().await;
        assert_eq!(ledger.remove_referral(user(42)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn count_never_goes_negative() {
        let ledger = ledger().await;
        ledger.record_referral(user(1), user(10)).await.unwrap();

        // Force the count to zero behind the ledger's back
        invite_tracking::Entity::update_many()
            .col_expr(invite_tracking::Column::InviteCount, Expr::value(0))
            .exec(&ledger.db)
            .await
            .unwrap();

        let removal = ledger.remove_referral(user(10)).await.unwrap().unwrap();
        assert_eq!(removal.count, 0);
        assert_eq!(ledger.remove_referral(user(10)).await.unwrap(), None);
        assert_eq!(ledger.referral_count(user(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lists_invitees_and_leaderboard() {
        let ledger = ledger().await;
        ledger.record_referral(user(1), user(10)).await.unwrap();
        ledger.record_referral(user(1), user(11)).await.unwrap();
        ledger.record_referral(user(2), user(12)).await.unwrap();

        let mut invitees = ledger.invitees_of(user(1)).await.unwrap();
        invitees.sort();
        assert_eq!(invitees, vec![user(10), user(11)]);

        let top = ledger.top_inviters(10).await.unwrap();
        assert_eq!(top, vec![(user(1), 2), (user(2), 1)]);
    }

    #[tokio::test]
    async fn concurrent_referrals_for_one_inviter_are_not_lost() {
        let ledger = std::sync::Arc::new(ledger().await);

        let tasks: Vec<_> = (0..10u64)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.record_referral(user(1), user(100 + i)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(ledger.referral_count(user(1)).await.unwrap(), 10);
    }
}
