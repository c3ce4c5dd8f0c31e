use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    TenantId,
    SenderId,
    ReceiverId,
    ConversationId,
    Text,
    AttachmentUrl,
    AttachmentName,
    AttachmentMime,
    SentAt,
    ReadAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000001_create_messages_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Messages::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Messages::TenantId).string().not_null())
                    .col(ColumnDef::new(Messages::SenderId).string().not_null())
                    .col(ColumnDef::new(Messages::ReceiverId).string().not_null())
                    .col(ColumnDef::new(Messages::ConversationId).string())
                    .col(ColumnDef::new(Messages::Text).string())
                    .col(ColumnDef::new(Messages::AttachmentUrl).string())
                    .col(ColumnDef::new(Messages::AttachmentName).string())
                    .col(ColumnDef::new(Messages::AttachmentMime).string())
                    .col(ColumnDef::new(Messages::SentAt).big_integer().not_null())
                    .col(ColumnDef::new(Messages::ReadAt).big_integer())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_messages_tenant_sender")
                    .table(Messages::Table)
                    .col(Messages::TenantId)
                    .col(Messages::SenderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_messages_tenant_receiver")
                    .table(Messages::Table)
                    .col(Messages::TenantId)
                    .col(Messages::ReceiverId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_messages_conversation")
                    .table(Messages::Table)
                    .col(Messages::ConversationId)
                    .col(Messages::SentAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await
    }
}
