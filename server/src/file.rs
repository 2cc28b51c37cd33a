use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::entities::{task, task_file};
use crate::norm;
use crate::policy::{self, Principal, TaskSnapshot};

/// Attachment metadata for a task. The stored blob itself is handled by
/// the upload layer; this crate only tracks the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFile {
    pub id: i32,
    pub task_id: i32,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub uploaded_by: i32,
    pub tags: Vec<String>,
    pub checksum: String,
}

impl From<task_file::Model> for TaskFile {
    fn from(model: task_file::Model) -> Self {
        TaskFile {
            id: model.id,
            task_id: model.task_id,
            original_name: model.original_name,
            stored_name: model.stored_name,
            mime_type: model.mime_type,
            size_bytes: model.size_bytes,
            storage_path: model.storage_path,
            uploaded_by: model.uploaded_by,
            tags: norm::string_list(&model.tags),
            checksum: model.checksum,
        }
    }
}

/// Metadata for a freshly stored upload.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskFile {
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub storage_path: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub checksum: String,
}

/// Error type for TaskFileService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskFileServiceError {
    /// Represents a task that does not exist.
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    /// Represents a file record that does not exist.
    #[error("File with ID {0} not found")]
    FileNotFound(i32),
    /// Represents a denied operation. The message stays generic.
    #[error("Forbidden")]
    Forbidden,
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub struct TaskFileService<'a> {
    db: &'a DatabaseConnection,
}

impl TaskFileService<'_> {
    pub fn new(db: &DatabaseConnection) -> TaskFileService {
        TaskFileService { db }
    }

    /// Lists the file records attached to a task.
    #[tracing::instrument(skip(self))]
    pub async fn list_files(
        &self,
        principal: &Principal,
        task_id: i32,
    ) -> Result<Vec<TaskFile>, TaskFileServiceError> {
        self.authorize_task_access(principal, task_id).await?;
        let files = task_file::Entity::find()
            .filter(task_file::Column::TaskId.eq(task_id))
            .order_by_asc(task_file::Column::Id)
            .all(self.db)
            .await?;
        Ok(files.into_iter().map(TaskFile::from).collect())
    }

    /// Records the metadata of an upload against a task.
    #[tracing::instrument(skip(self, meta))]
    pub async fn add_file(
        &self,
        principal: &Principal,
        task_id: i32,
        meta: NewTaskFile,
    ) -> Result<TaskFile, TaskFileServiceError> {
        self.authorize_task_access(principal, task_id).await?;
        let active_model = task_file::ActiveModel {
            task_id: ActiveValue::Set(task_id),
            original_name: ActiveValue::Set(meta.original_name),
            stored_name: ActiveValue::Set(meta.stored_name),
            mime_type: ActiveValue::Set(meta.mime_type),
            size_bytes: ActiveValue::Set(meta.size_bytes),
            storage_path: ActiveValue::Set(meta.storage_path),
            uploaded_by: ActiveValue::Set(principal.id),
            tags: ActiveValue::Set(serde_json::json!(meta.tags)),
            checksum: ActiveValue::Set(meta.checksum),
            created_at: ActiveValue::Set(chrono::Utc::now()),
            ..Default::default()
        };
        let created = active_model.insert(self.db).await?;
        Ok(TaskFile::from(created))
    }

    /// Replaces the tags on a file record.
    #[tracing::instrument(skip(self))]
    pub async fn update_tags(
        &self,
        principal: &Principal,
        file_id: i32,
        tags: Vec<String>,
    ) -> Result<TaskFile, TaskFileServiceError> {
        let model = task_file::Entity::find_by_id(file_id)
            .one(self.db)
            .await?
            .ok_or(TaskFileServiceError::FileNotFound(file_id))?;
        self.authorize_task_access(principal, model.task_id).await?;

        let mut active_model: task_file::ActiveModel = model.into();
        active_model.tags = ActiveValue::Set(serde_json::json!(tags));
        let updated = active_model.update(self.db).await?;
        Ok(TaskFile::from(updated))
    }

    /// Deletes a file record. Unlinking the stored blob is the caller's
    /// best-effort follow-up; a failure there must not undo this delete.
    #[tracing::instrument(skip(self))]
    pub async fn delete_file(
        &self,
        principal: &Principal,
        file_id: i32,
    ) -> Result<(), TaskFileServiceError> {
        let model = task_file::Entity::find_by_id(file_id)
            .one(self.db)
            .await?
            .ok_or(TaskFileServiceError::FileNotFound(file_id))?;
        self.authorize_task_access(principal, model.task_id).await?;

        task_file::Entity::delete_by_id(file_id).exec(self.db).await?;
        Ok(())
    }

    async fn authorize_task_access(
        &self,
        principal: &Principal,
        task_id: i32,
    ) -> Result<(), TaskFileServiceError> {
        let model = task::Entity::find_by_id(task_id)
            .one(self.db)
            .await?
            .ok_or(TaskFileServiceError::TaskNotFound(task_id))?;
        let assigned = norm::id_list(&model.assigned_to);
        let snapshot = TaskSnapshot {
            created_by: model.created_by,
            assigned_to: &assigned,
        };
        if !policy::can_access_task(principal, &snapshot) {
            return Err(TaskFileServiceError::Forbidden);
        }
        Ok(())
    }
}
