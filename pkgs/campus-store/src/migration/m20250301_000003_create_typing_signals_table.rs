use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum TypingSignals {
    Table,
    ConversationId,
    ParticipantId,
    TenantId,
    IsGroup,
    IsTyping,
    UpdatedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000003_create_typing_signals_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TypingSignals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(TypingSignals::TenantId).string().not_null())
                    .col(
                        ColumnDef::new(TypingSignals::ConversationId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TypingSignals::ParticipantId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TypingSignals::IsGroup)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(TypingSignals::IsTyping)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(TypingSignals::UpdatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(TypingSignals::TenantId)
                            .col(TypingSignals::ConversationId)
                            .col(TypingSignals::ParticipantId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TypingSignals::Table).to_owned())
            .await
    }
}
