use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Shared fixed-window counters, used when the rate limiter runs with
        // the database backend (multi-instance deployments). Keyed by
        // "ratelimit:<ip>"; reset_at is a unix-millisecond window boundary.
        manager
            .create_table(
                Table::create()
                    .table(RateLimitCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RateLimitCounters::Key)
                            .string_len(128)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RateLimitCounters::Count)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RateLimitCounters::ResetAt)
                            .big_integer()
                            .not_null(),
                    )
                    // Index for sweeping expired windows
                    .index(
                        Index::create()
                            .name("idx_rate_limit_reset_at")
                            .col(RateLimitCounters::ResetAt),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(RateLimitCounters::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum RateLimitCounters {
    Table,
    Key,
    Count,
    ResetAt,
}
