use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Waitlist signups collected by the marketing site
        manager
            .create_table(
                Table::create()
                    .table(WaitlistEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WaitlistEntries::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WaitlistEntries::Email)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(WaitlistEntries::Name)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(WaitlistEntries::Company).string_len(255))
                    .col(ColumnDef::new(WaitlistEntries::Role).string_len(64))
                    .col(
                        ColumnDef::new(WaitlistEntries::Newsletter)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(WaitlistEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    // Index for the admin listing (newest first)
                    .index(
                        Index::create()
                            .name("idx_waitlist_created_at")
                            .col(WaitlistEntries::CreatedAt),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WaitlistEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WaitlistEntries {
    Table,
    Id,
    Email,
    Name,
    Company,
    Role,
    Newsletter,
    CreatedAt,
}
