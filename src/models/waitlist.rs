use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::entities::waitlist_entry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitlistEntryView {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub newsletter: bool,
    pub created_at: DateTime<Utc>,
}

impl From<waitlist_entry::Model> for WaitlistEntryView {
    fn from(model: waitlist_entry::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            company: model.company,
            role: model.role,
            newsletter: model.newsletter,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}
