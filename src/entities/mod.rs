pub mod prelude;

pub mod rate_limit_counter;
pub mod waitlist_entry;
