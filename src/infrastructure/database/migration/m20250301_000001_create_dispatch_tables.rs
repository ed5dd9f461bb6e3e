//! Initial migration creating the sender and recipient tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Senders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Senders::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Senders::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Senders::Password).string())
                    .col(ColumnDef::new(Senders::Status).string())
                    .col(ColumnDef::new(Senders::RoundsCompleted).integer().not_null().default(0))
                    .col(ColumnDef::new(Senders::OriginalRow).integer().not_null())
                    .col(ColumnDef::new(Senders::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Recipients::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Recipients::Id).integer().not_null().auto_increment().primary_key())
                    .col(ColumnDef::new(Recipients::Email).string().not_null().unique_key())
                    .col(ColumnDef::new(Recipients::Status).string())
                    .col(ColumnDef::new(Recipients::StatusPeriod).string())
                    .col(ColumnDef::new(Recipients::OriginalRow).integer().not_null())
                    .col(ColumnDef::new(Recipients::UpdatedAt).timestamp_with_time_zone().not_null())
                    .to_owned(),
            )
            .await?;

        // Status columns drive every eligibility scan
        manager
            .create_index(
                Index::create()
                    .name("idx_senders_status")
                    .table(Senders::Table)
                    .col(Senders::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_senders_original_row")
                    .table(Senders::Table)
                    .col(Senders::OriginalRow)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_recipients_status")
                    .table(Recipients::Table)
                    .col(Recipients::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_recipients_original_row")
                    .table(Recipients::Table)
                    .col(Recipients::OriginalRow)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Senders::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Recipients::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Senders {
    Table,
    Id,
    Email,
    Password,
    Status,
    RoundsCompleted,
    OriginalRow,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Recipients {
    Table,
    Id,
    Email,
    Status,
    StatusPeriod,
    OriginalRow,
    UpdatedAt,
}
