use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaskFiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskFiles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskFiles::TaskId).integer().not_null())
                    .col(ColumnDef::new(TaskFiles::OriginalName).string().not_null())
                    .col(ColumnDef::new(TaskFiles::StoredName).string().not_null())
                    .col(ColumnDef::new(TaskFiles::MimeType).string().not_null())
                    .col(ColumnDef::new(TaskFiles::SizeBytes).big_integer().not_null())
                    .col(ColumnDef::new(TaskFiles::StoragePath).string().not_null())
                    .col(ColumnDef::new(TaskFiles::UploadedBy).integer().not_null())
                    .col(ColumnDef::new(TaskFiles::Tags).json().not_null())
                    .col(ColumnDef::new(TaskFiles::Checksum).string().not_null())
                    .col(
                        ColumnDef::new(TaskFiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_files_task_id")
                            .from(TaskFiles::Table, TaskFiles::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskFiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TaskFiles {
    Table,
    Id,
    TaskId,
    OriginalName,
    StoredName,
    MimeType,
    SizeBytes,
    StoragePath,
    UploadedBy,
    Tags,
    Checksum,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
}
