//! Shared fixed-window counter row for the database rate-limit backend.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_limit_counters")]
pub struct Model {
    /// Counter key, "ratelimit:<client ip>"
    #[sea_orm(primary_key, auto_increment = false)]
    #[sea_orm(column_type = "String(StringLen::N(128))")]
    pub key: String,
    /// Requests seen in the current window
    pub count: i64,
    /// Window boundary as a unix-millisecond timestamp
    pub reset_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
