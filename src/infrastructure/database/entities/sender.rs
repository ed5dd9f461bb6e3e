//! Sender account entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "senders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub email: String,
    pub password: Option<String>,
    /// Encoded lifecycle status; NULL means available
    pub status: Option<String>,
    /// Progress checkpoint within a multi-round send
    pub rounds_completed: i32,
    /// Stable ledger row, the public handle for this account
    pub original_row: i32,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
