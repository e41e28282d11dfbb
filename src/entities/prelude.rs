#![allow(unused_imports)]

pub use super::rate_limit_counter::Entity as RateLimitCounter;
pub use super::waitlist_entry::Entity as WaitlistEntry;
