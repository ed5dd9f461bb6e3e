//! Recipient entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "recipients")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub email: String,
    /// Lifecycle status; NULL means available
    pub status: Option<String>,
    /// Period marker the status belongs to; a stale period means the row is
    /// reclaimed without a write
    pub status_period: Option<String>,
    /// Stable ledger row, the public handle for this recipient
    pub original_row: i32,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
