use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Presence {
    Table,
    ParticipantId,
    TenantId,
    IsOnline,
    LastSeen,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000002_create_presence_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Presence::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Presence::TenantId).string().not_null())
                    .col(
                        ColumnDef::new(Presence::ParticipantId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Presence::IsOnline)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Presence::LastSeen).big_integer().not_null())
                    .primary_key(
                        Index::create()
                            .col(Presence::TenantId)
                            .col(Presence::ParticipantId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Presence::Table).to_owned())
            .await
    }
}
