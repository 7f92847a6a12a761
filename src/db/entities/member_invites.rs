use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "member_invites")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub member_id: i64,
    pub inviter_id: i64,
    pub invited_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::invite_tracking::Entity",
        from = "Column::InviterId",
        to = "super::invite_tracking::Column::InviterId"
    )]
    InviteTracking,
}

impl Related<super::invite_tracking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::InviteTracking.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
