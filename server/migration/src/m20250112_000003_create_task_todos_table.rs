use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TaskTodos::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TaskTodos::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TaskTodos::TaskId).integer().not_null())
                    .col(ColumnDef::new(TaskTodos::Text).string().not_null())
                    .col(
                        ColumnDef::new(TaskTodos::Completed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(TaskTodos::SortOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_task_todos_task_id")
                            .from(TaskTodos::Table, TaskTodos::TaskId)
                            .to(Tasks::Table, Tasks::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TaskTodos::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TaskTodos {
    Table,
    Id,
    TaskId,
    Text,
    Completed,
    SortOrder,
}

#[derive(DeriveIden)]
enum Tasks {
    Table,
    Id,
}
