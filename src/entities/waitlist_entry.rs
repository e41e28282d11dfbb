//! Waitlist entry entity for signups collected by the marketing site.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "waitlist_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Contact email, sanitized and lowercased; unique across all entries
    #[sea_orm(column_type = "String(StringLen::N(255))", unique)]
    pub email: String,
    /// Display name as submitted, after sanitization
    #[sea_orm(column_type = "String(StringLen::N(100))")]
    pub name: String,
    #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
    pub company: Option<String>,
    /// Self-reported role label; advisory only, not validated server-side
    #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
    pub role: Option<String>,
    /// Newsletter opt-in flag
    pub newsletter: bool,
    /// Timestamp of the signup
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
