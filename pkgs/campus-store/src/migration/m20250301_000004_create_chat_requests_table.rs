use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum ChatRequests {
    Table,
    Id,
    TenantId,
    SenderId,
    ReceiverId,
    Status,
    CreatedAt,
    RespondedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000004_create_chat_requests_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChatRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChatRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ChatRequests::TenantId).string().not_null())
                    .col(ColumnDef::new(ChatRequests::SenderId).string().not_null())
                    .col(ColumnDef::new(ChatRequests::ReceiverId).string().not_null())
                    .col(
                        ColumnDef::new(ChatRequests::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(ChatRequests::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(ChatRequests::RespondedAt).big_integer())
                    .to_owned(),
            )
            .await?;

        // One pending request per unordered pair, whoever asked first
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX IF NOT EXISTS idx_chat_requests_pending_pair \
                 ON chat_requests (tenant_id, min(sender_id, receiver_id), \
                 max(sender_id, receiver_id)) \
                 WHERE status = 'pending'",
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_chat_requests_receiver")
                    .table(ChatRequests::Table)
                    .col(ChatRequests::TenantId)
                    .col(ChatRequests::ReceiverId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChatRequests::Table).to_owned())
            .await
    }
}
