use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One row per inviter, never deleted
        manager
            .create_table(
                Table::create()
                    .table(InviteTracking::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InviteTracking::InviterId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InviteTracking::InviteCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(InviteTracking::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per attributed member, the primary key keeps it to one inviter
        manager
            .create_table(
                Table::create()
                    .table(MemberInvites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MemberInvites::MemberId)
                            .big_integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MemberInvites::InviterId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MemberInvites::InvitedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-member-invites-inviter")
                            .from(MemberInvites::Table, MemberInvites::InviterId)
                            .to(InviteTracking::Table, InviteTracking::InviterId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-member-invites-inviter")
                    .table(MemberInvites::Table)
                    .col(MemberInvites::InviterId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MemberInvites::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(InviteTracking::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum InviteTracking {
    Table,
    InviterId,
    InviteCount,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum MemberInvites {
    Table,
    MemberId,
    InviterId,
    InvitedAt,
}
