use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub priority: String,
    pub status: String,
    pub due_date: DateTimeUtc,
    pub assigned_to: Json,
    pub created_by: i32,
    pub progress: i32,
    pub attachments: Json,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::task_todo::Entity")]
    TaskTodo,
    #[sea_orm(has_many = "super::task_file::Entity")]
    TaskFile,
}

impl Related<super::task_todo::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskTodo.def()
    }
}

impl Related<super::task_file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TaskFile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
