use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::entities::{task, task_todo};
use crate::norm;
use crate::policy::{self, Principal, TaskField, TaskSnapshot};

pub mod checklist;

pub use checklist::{ChecklistState, completion_flag, derive_checklist_state};

/// Default page size for task listings.
const DEFAULT_PAGE_SIZE: u64 = 50;

/// Task urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "Low",
            TaskPriority::Medium => "Medium",
            TaskPriority::High => "High",
        }
    }

    /// Parses a priority string, returning `None` for unrecognized values.
    pub fn parse(raw: &str) -> Option<TaskPriority> {
        match raw {
            "Low" => Some(TaskPriority::Low),
            "Medium" => Some(TaskPriority::Medium),
            "High" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::InProgress => "In Progress",
            TaskStatus::Completed => "Completed",
        }
    }

    /// Parses a status string, returning `None` for unrecognized values.
    pub fn parse(raw: &str) -> Option<TaskStatus> {
        match raw {
            "Pending" => Some(TaskStatus::Pending),
            "In Progress" => Some(TaskStatus::InProgress),
            "Completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }
}

/// One checklist item belonging to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoItem {
    pub id: i32,
    pub text: String,
    pub completed: bool,
    pub sort_order: i32,
}

impl From<task_todo::Model> for TodoItem {
    fn from(model: task_todo::Model) -> Self {
        TodoItem {
            id: model.id,
            text: model.text,
            completed: model.completed,
            sort_order: model.sort_order,
        }
    }
}

/// A task as exposed to callers. The assignee and attachment lists are
/// always concrete lists, never the raw JSON the store keeps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: i32,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_date: DateTime<Utc>,
    pub assigned_to: Vec<i32>,
    pub created_by: i32,
    pub progress: i32,
    pub attachments: Vec<String>,
    pub todo_checklist: Vec<TodoItem>,
}

impl Task {
    fn snapshot(&self) -> TaskSnapshot<'_> {
        TaskSnapshot {
            created_by: self.created_by,
            assigned_to: &self.assigned_to,
        }
    }
}

impl From<task::Model> for Task {
    fn from(model: task::Model) -> Self {
        Task {
            id: model.id,
            title: model.title,
            description: model.description,
            priority: TaskPriority::parse(&model.priority).unwrap_or(TaskPriority::Medium),
            status: TaskStatus::parse(&model.status).unwrap_or(TaskStatus::Pending),
            due_date: model.due_date,
            assigned_to: norm::id_list(&model.assigned_to),
            created_by: model.created_by,
            progress: model.progress,
            attachments: norm::string_list(&model.attachments),
            // Checklist rows live in their own table; filled in by the
            // service for callers that need them.
            todo_checklist: Vec::new(),
        }
    }
}

/// A listing row: the task plus its checklist tallies, so callers can show
/// a completion ratio without a second round-trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSummary {
    pub task: Task,
    pub todo_total_count: u64,
    pub completed_todo_count: u64,
}

/// Filters accepted by [`TaskService::list_tasks`].
///
/// `status` and `priority` are kept as raw strings: unrecognized values are
/// silently ignored rather than rejected.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TaskFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
    pub due_from: Option<DateTime<Utc>>,
    pub due_to: Option<DateTime<Utc>>,
    pub assigned_to: Option<i32>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// A checklist item as submitted by a client. The completion flag is kept
/// as raw JSON because clients send it as a bool, a number, or a string.
#[derive(Debug, Clone, Deserialize)]
pub struct TodoInput {
    pub text: String,
    #[serde(default)]
    pub completed: serde_json::Value,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_date: DateTime<Utc>,
    #[serde(default)]
    pub assigned_to: Vec<i32>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub todo_checklist: Vec<TodoInput>,
}

/// Field patch for a task; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TaskPriority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Vec<i32>>,
    pub progress: Option<i32>,
    pub attachments: Option<Vec<String>>,
}

/// Error type for TaskService operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    /// Represents a task that does not exist.
    #[error("Task with ID {0} not found")]
    TaskNotFound(i32),
    /// Represents a denied operation. The message stays generic so callers
    /// learn nothing about why.
    #[error("Forbidden")]
    Forbidden,
    /// Represents malformed input, rejected before any mutation.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// SQL membership test against the `assigned_to` JSON column.
///
/// There is no portable JSON containment expression, so the statement is
/// picked per backend.
fn assignee_contains(backend: DatabaseBackend, user_id: i32) -> SimpleExpr {
    match backend {
        DatabaseBackend::MySql => {
            Expr::cust_with_values("JSON_CONTAINS(`assigned_to`, ?)", [user_id.to_string()])
        }
        DatabaseBackend::Postgres => {
            Expr::cust_with_values("\"assigned_to\"::jsonb @> ?::jsonb", [user_id.to_string()])
        }
        DatabaseBackend::Sqlite => Expr::cust_with_values(
            "EXISTS (SELECT 1 FROM json_each(\"tasks\".\"assigned_to\") WHERE \"json_each\".\"value\" = ?)",
            [user_id],
        ),
    }
}

fn validate_progress(progress: i32) -> Result<(), TaskServiceError> {
    if !(0..=100).contains(&progress) {
        return Err(TaskServiceError::Validation(format!(
            "progress must be between 0 and 100, got {progress}"
        )));
    }
    Ok(())
}

pub struct TaskService<'a> {
    db: &'a DatabaseConnection,
}

impl TaskService<'_> {
    pub fn new(db: &DatabaseConnection) -> TaskService {
        TaskService { db }
    }

    /// Lists the tasks visible to `principal`, filtered and paginated.
    ///
    /// Non-admins only ever see tasks they are assigned to; that restriction
    /// is ANDed with every other filter and a caller-supplied `assigned_to`
    /// cannot widen it. Admins see everything, optionally narrowed to one
    /// assignee.
    #[tracing::instrument(skip(self))]
    pub async fn list_tasks(
        &self,
        principal: &Principal,
        filter: TaskFilter,
    ) -> Result<Vec<TaskSummary>, TaskServiceError> {
        let backend = self.db.get_database_backend();
        let mut query = task::Entity::find();

        if !principal.is_admin() {
            query = query.filter(assignee_contains(backend, principal.id));
        } else if let Some(assignee) = filter.assigned_to {
            query = query.filter(assignee_contains(backend, assignee));
        }

        // Unrecognized enum filter values are ignored, not rejected.
        if let Some(status) = filter.status.as_deref().and_then(TaskStatus::parse) {
            query = query.filter(task::Column::Status.eq(status.as_str()));
        }
        if let Some(priority) = filter.priority.as_deref().and_then(TaskPriority::parse) {
            query = query.filter(task::Column::Priority.eq(priority.as_str()));
        }
        if let Some(term) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(task::Column::Title.contains(term))
                    .add(task::Column::Description.contains(term)),
            );
        }
        if let Some(due_from) = filter.due_from {
            query = query.filter(task::Column::DueDate.gte(due_from));
        }
        if let Some(due_to) = filter.due_to {
            query = query.filter(task::Column::DueDate.lte(due_to));
        }

        let models = query
            .order_by_asc(task::Column::DueDate)
            .limit(filter.limit.unwrap_or(DEFAULT_PAGE_SIZE))
            .offset(filter.offset.unwrap_or(0))
            .all(self.db)
            .await?;

        let ids: Vec<i32> = models.iter().map(|model| model.id).collect();
        let mut counts: HashMap<i32, (u64, u64)> = HashMap::new();
        if !ids.is_empty() {
            let todos = task_todo::Entity::find()
                .filter(task_todo::Column::TaskId.is_in(ids))
                .all(self.db)
                .await?;
            for todo in todos {
                let entry = counts.entry(todo.task_id).or_insert((0, 0));
                entry.0 += 1;
                if todo.completed {
                    entry.1 += 1;
                }
            }
        }

        Ok(models
            .into_iter()
            .map(|model| {
                let (total, done) = counts.get(&model.id).copied().unwrap_or((0, 0));
                TaskSummary {
                    task: Task::from(model),
                    todo_total_count: total,
                    completed_todo_count: done,
                }
            })
            .collect())
    }

    /// Retrieves a single task with its checklist.
    ///
    /// # Arguments
    ///
    /// * `principal` - The acting identity.
    /// * `id` - The ID of the task to retrieve.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Task` if it exists and the principal may
    /// read it, or an error otherwise.
    #[tracing::instrument(skip(self))]
    pub async fn get_task(&self, principal: &Principal, id: i32) -> Result<Task, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;

        let mut loaded = Task::from(model);
        if !policy::can_access_task(principal, &loaded.snapshot()) {
            return Err(TaskServiceError::Forbidden);
        }
        loaded.todo_checklist = self.load_checklist(id).await?;
        Ok(loaded)
    }

    /// Creates a task. Admin only.
    ///
    /// The initial status and progress are derived from the submitted
    /// checklist, so a task created with completed items starts out
    /// partially (or fully) done.
    #[tracing::instrument(skip(self, req))]
    pub async fn create_task(
        &self,
        principal: &Principal,
        req: CreateTaskRequest,
    ) -> Result<Task, TaskServiceError> {
        if !principal.is_admin() {
            return Err(TaskServiceError::Forbidden);
        }
        let title = req.title.trim();
        if title.is_empty() {
            return Err(TaskServiceError::Validation(
                "title must not be empty".to_string(),
            ));
        }

        let derived = derive_checklist_state(
            req.todo_checklist
                .iter()
                .map(|item| completion_flag(&item.completed)),
        );
        let now = Utc::now();
        let active_model = task::ActiveModel {
            title: ActiveValue::Set(title.to_string()),
            description: ActiveValue::Set(req.description),
            priority: ActiveValue::Set(req.priority.as_str().to_string()),
            status: ActiveValue::Set(derived.status.as_str().to_string()),
            due_date: ActiveValue::Set(req.due_date),
            assigned_to: ActiveValue::Set(serde_json::json!(req.assigned_to)),
            created_by: ActiveValue::Set(principal.id),
            progress: ActiveValue::Set(derived.progress),
            attachments: ActiveValue::Set(serde_json::json!(req.attachments)),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
            ..Default::default()
        };
        let created = active_model.insert(self.db).await?;
        self.replace_todos(created.id, &req.todo_checklist).await?;

        let mut task = Task::from(created);
        task.todo_checklist = self.load_checklist(task.id).await?;
        Ok(task)
    }

    /// Applies a field patch to a task.
    ///
    /// Admins may patch any field; an assignee or the creator only
    /// description, attachments, and progress. Progress is validated to
    /// [0, 100] before anything is written, and status/progress patches are
    /// rejected while the task has a checklist (derived state is canonical
    /// then).
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_task(
        &self,
        principal: &Principal,
        id: i32,
        patch: UpdateTaskRequest,
    ) -> Result<Task, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;

        if let Some(progress) = patch.progress {
            validate_progress(progress)?;
        }
        if let Some(title) = patch.title.as_deref() {
            if title.trim().is_empty() {
                return Err(TaskServiceError::Validation(
                    "title must not be empty".to_string(),
                ));
            }
        }

        let assigned = norm::id_list(&model.assigned_to);
        let snapshot = TaskSnapshot {
            created_by: model.created_by,
            assigned_to: &assigned,
        };
        if !policy::can_access_task(principal, &snapshot) {
            return Err(TaskServiceError::Forbidden);
        }
        let requested_fields = [
            (patch.title.is_some(), TaskField::Title),
            (patch.description.is_some(), TaskField::Description),
            (patch.priority.is_some(), TaskField::Priority),
            (patch.status.is_some(), TaskField::Status),
            (patch.due_date.is_some(), TaskField::DueDate),
            (patch.assigned_to.is_some(), TaskField::AssignedTo),
            (patch.progress.is_some(), TaskField::Progress),
            (patch.attachments.is_some(), TaskField::Attachments),
        ];
        for (present, field) in requested_fields {
            if present && !policy::can_mutate_task_field(principal, &snapshot, field) {
                return Err(TaskServiceError::Forbidden);
            }
        }

        if patch.status.is_some() || patch.progress.is_some() {
            self.ensure_checklist_is_empty(id).await?;
        }

        let mut active_model: task::ActiveModel = model.into();
        if let Some(title) = patch.title {
            active_model.title = ActiveValue::Set(title.trim().to_string());
        }
        if let Some(description) = patch.description {
            active_model.description = ActiveValue::Set(Some(description));
        }
        if let Some(priority) = patch.priority {
            active_model.priority = ActiveValue::Set(priority.as_str().to_string());
        }
        if let Some(status) = patch.status {
            active_model.status = ActiveValue::Set(status.as_str().to_string());
        }
        if let Some(due_date) = patch.due_date {
            active_model.due_date = ActiveValue::Set(due_date);
        }
        if let Some(assigned_to) = patch.assigned_to {
            active_model.assigned_to = ActiveValue::Set(serde_json::json!(assigned_to));
        }
        if let Some(progress) = patch.progress {
            active_model.progress = ActiveValue::Set(progress);
        }
        if let Some(attachments) = patch.attachments {
            active_model.attachments = ActiveValue::Set(serde_json::json!(attachments));
        }
        active_model.updated_at = ActiveValue::Set(Utc::now());
        let updated = active_model.update(self.db).await?;

        let mut task = Task::from(updated);
        task.todo_checklist = self.load_checklist(id).await?;
        Ok(task)
    }

    /// Changes a task's status through the dedicated status operation.
    ///
    /// Only admins and assignees may; a creator who is not assigned cannot.
    /// Rejected while the task has a checklist, since the checklist is the
    /// source of truth for status then. Completing a checklist-less task
    /// without an explicit progress value sets progress to 100.
    #[tracing::instrument(skip(self))]
    pub async fn update_task_status(
        &self,
        principal: &Principal,
        id: i32,
        status: TaskStatus,
        progress: Option<i32>,
    ) -> Result<Task, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;

        if let Some(progress) = progress {
            validate_progress(progress)?;
        }

        let assigned = norm::id_list(&model.assigned_to);
        let snapshot = TaskSnapshot {
            created_by: model.created_by,
            assigned_to: &assigned,
        };
        if !policy::can_update_status(principal, &snapshot) {
            return Err(TaskServiceError::Forbidden);
        }
        self.ensure_checklist_is_empty(id).await?;

        let mut active_model: task::ActiveModel = model.into();
        active_model.status = ActiveValue::Set(status.as_str().to_string());
        match progress {
            Some(progress) => active_model.progress = ActiveValue::Set(progress),
            None if status == TaskStatus::Completed => {
                active_model.progress = ActiveValue::Set(100)
            }
            None => {}
        }
        active_model.updated_at = ActiveValue::Set(Utc::now());
        let updated = active_model.update(self.db).await?;
        Ok(Task::from(updated))
    }

    /// Replaces a task's checklist and refreshes the cached status and
    /// progress from the new items.
    ///
    /// # Arguments
    ///
    /// * `principal` - The acting identity; must be an admin or an assignee.
    /// * `id` - The ID of the task whose checklist is replaced.
    /// * `items` - The new checklist in order.
    ///
    /// # Returns
    ///
    /// A `Result` containing the refreshed `Task` if successful, or an error
    /// otherwise.
    #[tracing::instrument(skip(self, items))]
    pub async fn update_checklist(
        &self,
        principal: &Principal,
        id: i32,
        items: Vec<TodoInput>,
    ) -> Result<Task, TaskServiceError> {
        let model = task::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(TaskServiceError::TaskNotFound(id))?;

        let assigned = norm::id_list(&model.assigned_to);
        let snapshot = TaskSnapshot {
            created_by: model.created_by,
            assigned_to: &assigned,
        };
        if !policy::can_update_status(principal, &snapshot) {
            return Err(TaskServiceError::Forbidden);
        }

        self.replace_todos(id, &items).await?;
        let derived = derive_checklist_state(
            items.iter().map(|item| completion_flag(&item.completed)),
        );

        let mut active_model: task::ActiveModel = model.into();
        active_model.status = ActiveValue::Set(derived.status.as_str().to_string());
        active_model.progress = ActiveValue::Set(derived.progress);
        active_model.updated_at = ActiveValue::Set(Utc::now());
        let updated = active_model.update(self.db).await?;

        let mut task = Task::from(updated);
        task.todo_checklist = self.load_checklist(id).await?;
        Ok(task)
    }

    /// Deletes a task. Admin only. Checklist and file-metadata rows go with
    /// it through the store's foreign-key cascade.
    #[tracing::instrument(skip(self))]
    pub async fn delete_task(&self, principal: &Principal, id: i32) -> Result<(), TaskServiceError> {
        if !principal.is_admin() {
            return Err(TaskServiceError::Forbidden);
        }
        let result = task::Entity::delete_by_id(id).exec(self.db).await?;
        if result.rows_affected == 0 {
            return Err(TaskServiceError::TaskNotFound(id));
        }
        tracing::info!("Deleted task {}", id);
        Ok(())
    }

    async fn load_checklist(&self, task_id: i32) -> Result<Vec<TodoItem>, TaskServiceError> {
        let todos = task_todo::Entity::find()
            .filter(task_todo::Column::TaskId.eq(task_id))
            .order_by_asc(task_todo::Column::SortOrder)
            .all(self.db)
            .await?;
        Ok(todos.into_iter().map(TodoItem::from).collect())
    }

    async fn replace_todos(
        &self,
        task_id: i32,
        items: &[TodoInput],
    ) -> Result<(), TaskServiceError> {
        task_todo::Entity::delete_many()
            .filter(task_todo::Column::TaskId.eq(task_id))
            .exec(self.db)
            .await?;
        if items.is_empty() {
            return Ok(());
        }
        let rows: Vec<task_todo::ActiveModel> = items
            .iter()
            .enumerate()
            .map(|(index, item)| task_todo::ActiveModel {
                task_id: ActiveValue::Set(task_id),
                text: ActiveValue::Set(item.text.clone()),
                completed: ActiveValue::Set(completion_flag(&item.completed)),
                sort_order: ActiveValue::Set(item.sort_order.unwrap_or(index as i32)),
                ..Default::default()
            })
            .collect();
        task_todo::Entity::insert_many(rows).exec(self.db).await?;
        Ok(())
    }

    async fn ensure_checklist_is_empty(&self, task_id: i32) -> Result<(), TaskServiceError> {
        let todo_count = task_todo::Entity::find()
            .filter(task_todo::Column::TaskId.eq(task_id))
            .count(self.db)
            .await?;
        if todo_count > 0 {
            return Err(TaskServiceError::Validation(
                "status and progress are derived from the checklist while it has items"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
