pub use sea_orm_migration::prelude::*;

mod m20250112_000001_create_users_table;
mod m20250112_000002_create_tasks_table;
mod m20250112_000003_create_task_todos_table;
mod m20250112_000004_create_task_files_table;
mod m20250112_000005_create_companies_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250112_000001_create_users_table::Migration),
            Box::new(m20250112_000002_create_tasks_table::Migration),
            Box::new(m20250112_000003_create_task_todos_table::Migration),
            Box::new(m20250112_000004_create_task_files_table::Migration),
            Box::new(m20250112_000005_create_companies_table::Migration),
        ]
    }
}
