//! Initial schema: resolution cache and deferred resolution queue
//!
//! Timestamps follow the convention used across the schema: `timestamptz` on
//! PostgreSQL, RFC 3339 text elsewhere.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

impl Migration {
    fn create_timestamp_column(&self, manager: &SchemaManager, column: impl IntoIden) -> ColumnDef {
        let mut col = ColumnDef::new(column);
        match manager.get_database_backend() {
            sea_orm::DatabaseBackend::Postgres => col.timestamp_with_time_zone().not_null(),
            _ => col.string().not_null(),
        };
        col
    }

    async fn create_company_name_index_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CompanyNameIndex::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CompanyNameIndex::NormalizedName)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CompanyNameIndex::CompanyId).string().not_null())
                    .col(ColumnDef::new(CompanyNameIndex::MatchType).string().not_null())
                    .col(ColumnDef::new(CompanyNameIndex::Confidence).double().not_null())
                    .col(ColumnDef::new(CompanyNameIndex::Source).string().not_null())
                    .col(self.create_timestamp_column(manager, CompanyNameIndex::CreatedAt))
                    .col(self.create_timestamp_column(manager, CompanyNameIndex::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_company_name_index_company_id")
                    .table(CompanyNameIndex::Table)
                    .col(CompanyNameIndex::CompanyId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn create_deferred_resolutions_table(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(DeferredResolutions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeferredResolutions::NormalizedName)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(DeferredResolutions::RawName).string().not_null())
                    .col(ColumnDef::new(DeferredResolutions::TempId).string().not_null())
                    .col(
                        ColumnDef::new(DeferredResolutions::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(DeferredResolutions::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(self.create_timestamp_column(manager, DeferredResolutions::NextAttemptAt))
                    .col(ColumnDef::new(DeferredResolutions::LastError).text().null())
                    .col(self.create_timestamp_column(manager, DeferredResolutions::FirstSeen))
                    .col(self.create_timestamp_column(manager, DeferredResolutions::LastSeen))
                    .col(self.create_timestamp_column(manager, DeferredResolutions::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_deferred_resolutions_status_next_attempt")
                    .table(DeferredResolutions::Table)
                    .col(DeferredResolutions::Status)
                    .col(DeferredResolutions::NextAttemptAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_company_name_index_table(manager).await?;
        self.create_deferred_resolutions_table(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DeferredResolutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CompanyNameIndex::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CompanyNameIndex {
    Table,
    NormalizedName,
    CompanyId,
    MatchType,
    Confidence,
    Source,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DeferredResolutions {
    Table,
    NormalizedName,
    RawName,
    TempId,
    Status,
    Attempts,
    NextAttemptAt,
    LastError,
    FirstSeen,
    LastSeen,
    UpdatedAt,
}
