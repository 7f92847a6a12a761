use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "invite_tracking")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub inviter_id: i64,
    pub invite_count: i32,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::member_invites::Entity")]
    MemberInvites,
}

impl Related<super::member_invites::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MemberInvites.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
