pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_waitlist_table;
mod m20250601_000002_add_rate_limit_counters;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_waitlist_table::Migration),
            Box::new(m20250601_000002_add_rate_limit_counters::Migration),
        ]
    }
}
