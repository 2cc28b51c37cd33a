use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;

use taskboard_server::entities::{task, task_todo};
use taskboard_server::policy::{Principal, Role};
use taskboard_server::task::{
    CreateTaskRequest, TaskFilter, TaskPriority, TaskService, TaskServiceError, TaskStatus,
    TodoInput, UpdateTaskRequest,
};

mod common;

pub struct TestContext {
    pub db: DatabaseConnection,
}

async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().try_init();
    let db = common::setup_db().await?;
    Ok(TestContext { db })
}

fn admin() -> Principal {
    Principal::new(1, Role::Admin)
}

fn member(id: i32) -> Principal {
    Principal::new(id, Role::Member)
}

async fn seed_task(
    db: &DatabaseConnection,
    title: &str,
    due_in_days: i64,
    status: &str,
    priority: &str,
    assigned_to: serde_json::Value,
    created_by: i32,
) -> task::Model {
    let now = Utc::now();
    let active_model = task::ActiveModel {
        title: ActiveValue::Set(title.to_string()),
        description: ActiveValue::Set(None),
        priority: ActiveValue::Set(priority.to_string()),
        status: ActiveValue::Set(status.to_string()),
        due_date: ActiveValue::Set(now + Duration::days(due_in_days)),
        assigned_to: ActiveValue::Set(assigned_to),
        created_by: ActiveValue::Set(created_by),
        progress: ActiveValue::Set(0),
        attachments: ActiveValue::Set(json!([])),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
        ..Default::default()
    };
    active_model.insert(db).await.expect("Failed to seed task")
}

async fn seed_todo(db: &DatabaseConnection, task_id: i32, text: &str, completed: bool, sort_order: i32) {
    let active_model = task_todo::ActiveModel {
        task_id: ActiveValue::Set(task_id),
        text: ActiveValue::Set(text.to_string()),
        completed: ActiveValue::Set(completed),
        sort_order: ActiveValue::Set(sort_order),
        ..Default::default()
    };
    active_model.insert(db).await.expect("Failed to seed todo");
}

#[tokio::test]
async fn can_create_task_with_derived_state() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);

    let created = service
        .create_task(
            &admin(),
            CreateTaskRequest {
                title: "Prepare release".to_string(),
                description: Some("Cut the 2.4 release".to_string()),
                priority: TaskPriority::High,
                due_date: Utc::now() + Duration::days(3),
                assigned_to: vec![7, 9],
                attachments: vec!["https://wiki/release-notes".to_string()],
                todo_checklist: vec![
                    TodoInput {
                        text: "Tag the build".to_string(),
                        completed: json!(true),
                        sort_order: None,
                    },
                    TodoInput {
                        text: "Publish artifacts".to_string(),
                        completed: json!(false),
                        sort_order: None,
                    },
                ],
            },
        )
        .await
        .expect("Failed to create task");

    assert_eq!(created.status, TaskStatus::InProgress);
    assert_eq!(created.progress, 50);
    assert_eq!(created.assigned_to, vec![7, 9]);
    assert_eq!(created.created_by, 1);
    assert_eq!(created.todo_checklist.len(), 2);
    assert!(created.todo_checklist[0].completed);
    assert!(!created.todo_checklist[1].completed);
}

#[tokio::test]
async fn non_admin_cannot_create_task() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);

    let result = service
        .create_task(
            &member(7),
            CreateTaskRequest {
                title: "Sneaky".to_string(),
                description: None,
                priority: TaskPriority::Low,
                due_date: Utc::now(),
                assigned_to: vec![],
                attachments: vec![],
                todo_checklist: vec![],
            },
        )
        .await;
    assert!(matches!(result, Err(TaskServiceError::Forbidden)));
}

#[tokio::test]
async fn empty_title_is_rejected() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);

    let result = service
        .create_task(
            &admin(),
            CreateTaskRequest {
                title: "   ".to_string(),
                description: None,
                priority: TaskPriority::Low,
                due_date: Utc::now(),
                assigned_to: vec![],
                attachments: vec![],
                todo_checklist: vec![],
            },
        )
        .await;
    assert!(matches!(result, Err(TaskServiceError::Validation(_))));
}

#[tokio::test]
async fn assignee_and_creator_can_read_but_others_cannot() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Audit", 1, "Pending", "Medium", json!([7]), 5).await;

    assert!(service.get_task(&member(7), model.id).await.is_ok());
    assert!(service.get_task(&member(5), model.id).await.is_ok());
    assert!(service.get_task(&admin(), model.id).await.is_ok());

    let result = service.get_task(&member(8), model.id).await;
    assert!(matches!(result, Err(TaskServiceError::Forbidden)));
}

#[tokio::test]
async fn missing_task_is_not_found_not_forbidden() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);

    let result = service.get_task(&member(8), 4242).await;
    assert!(matches!(result, Err(TaskServiceError::TaskNotFound(4242))));
}

#[tokio::test]
async fn non_admin_sees_only_assigned_tasks() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    seed_task(&state.db, "Mine", 1, "Pending", "Medium", json!([7]), 1).await;
    seed_task(&state.db, "Also mine", 2, "Pending", "Medium", json!([5, 7]), 1).await;
    seed_task(&state.db, "Not mine", 3, "Pending", "Medium", json!([5]), 1).await;

    let rows = service
        .list_tasks(&member(7), TaskFilter::default())
        .await
        .expect("Failed to list tasks");
    let titles: Vec<&str> = rows.iter().map(|row| row.task.title.as_str()).collect();
    assert_eq!(titles, vec!["Mine", "Also mine"]);
}

#[tokio::test]
async fn assignee_filter_cannot_widen_non_admin_visibility() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    seed_task(&state.db, "Mine", 1, "Pending", "Medium", json!([7]), 1).await;
    seed_task(&state.db, "Someone else's", 2, "Pending", "Medium", json!([5]), 1).await;

    // A non-admin asking for someone else's assignments still only gets
    // their own.
    let rows = service
        .list_tasks(
            &member(7),
            TaskFilter {
                assigned_to: Some(5),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list tasks");
    let titles: Vec<&str> = rows.iter().map(|row| row.task.title.as_str()).collect();
    assert_eq!(titles, vec!["Mine"]);
}

#[tokio::test]
async fn admin_sees_all_and_can_filter_by_assignee() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    seed_task(&state.db, "A", 1, "Pending", "Medium", json!([7]), 1).await;
    seed_task(&state.db, "B", 2, "Pending", "Medium", json!([5]), 1).await;

    let all = service
        .list_tasks(&admin(), TaskFilter::default())
        .await
        .expect("Failed to list tasks");
    assert_eq!(all.len(), 2);

    let only_five = service
        .list_tasks(
            &admin(),
            TaskFilter {
                assigned_to: Some(5),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list tasks");
    assert_eq!(only_five.len(), 1);
    assert_eq!(only_five[0].task.title, "B");
}

#[tokio::test]
async fn invalid_enum_filters_are_silently_ignored() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    seed_task(&state.db, "A", 1, "Pending", "Medium", json!([]), 1).await;
    seed_task(&state.db, "B", 2, "Completed", "High", json!([]), 1).await;

    let rows = service
        .list_tasks(
            &admin(),
            TaskFilter {
                status: Some("NotAStatus".to_string()),
                priority: Some("Extreme".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list tasks");
    assert_eq!(rows.len(), 2);

    let completed = service
        .list_tasks(
            &admin(),
            TaskFilter {
                status: Some("Completed".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list tasks");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].task.title, "B");
}

#[tokio::test]
async fn search_matches_title_or_description_case_insensitively() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    seed_task(&state.db, "Design review", 1, "Pending", "Medium", json!([]), 1).await;
    let with_description = seed_task(&state.db, "Misc", 2, "Pending", "Medium", json!([]), 1).await;
    let mut active_model: task::ActiveModel = with_description.into();
    active_model.description = ActiveValue::Set(Some("Update the design doc".to_string()));
    active_model
        .update(&state.db)
        .await
        .expect("Failed to set description");
    seed_task(&state.db, "Unrelated", 3, "Pending", "Medium", json!([]), 1).await;

    let rows = service
        .list_tasks(
            &admin(),
            TaskFilter {
                search: Some("design".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list tasks");
    let titles: Vec<&str> = rows.iter().map(|row| row.task.title.as_str()).collect();
    assert_eq!(titles, vec!["Design review", "Misc"]);
}

#[tokio::test]
async fn listing_orders_by_due_date_and_paginates() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    seed_task(&state.db, "Third", 3, "Pending", "Medium", json!([]), 1).await;
    seed_task(&state.db, "First", 1, "Pending", "Medium", json!([]), 1).await;
    seed_task(&state.db, "Second", 2, "Pending", "Medium", json!([]), 1).await;

    let rows = service
        .list_tasks(&admin(), TaskFilter::default())
        .await
        .expect("Failed to list tasks");
    let titles: Vec<&str> = rows.iter().map(|row| row.task.title.as_str()).collect();
    assert_eq!(titles, vec!["First", "Second", "Third"]);

    let page = service
        .list_tasks(
            &admin(),
            TaskFilter {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list tasks");
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].task.title, "Second");
}

#[tokio::test]
async fn due_date_bounds_are_inclusive() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let early = seed_task(&state.db, "Early", 1, "Pending", "Medium", json!([]), 1).await;
    let late = seed_task(&state.db, "Late", 5, "Pending", "Medium", json!([]), 1).await;
    seed_task(&state.db, "Way out", 30, "Pending", "Medium", json!([]), 1).await;

    let rows = service
        .list_tasks(
            &admin(),
            TaskFilter {
                due_from: Some(early.due_date),
                due_to: Some(late.due_date),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to list tasks");
    let titles: Vec<&str> = rows.iter().map(|row| row.task.title.as_str()).collect();
    assert_eq!(titles, vec!["Early", "Late"]);
}

#[tokio::test]
async fn listing_reports_checklist_tallies() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Tallied", 1, "In Progress", "Medium", json!([]), 1).await;
    seed_todo(&state.db, model.id, "a", true, 0).await;
    seed_todo(&state.db, model.id, "b", false, 1).await;
    seed_todo(&state.db, model.id, "c", false, 2).await;

    let rows = service
        .list_tasks(&admin(), TaskFilter::default())
        .await
        .expect("Failed to list tasks");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].todo_total_count, 3);
    assert_eq!(rows[0].completed_todo_count, 1);
}

#[tokio::test]
async fn assignee_can_patch_description_but_not_priority() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Patchable", 1, "Pending", "Medium", json!([7]), 1).await;

    let updated = service
        .update_task(
            &member(7),
            model.id,
            UpdateTaskRequest {
                description: Some("now with details".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to patch description");
    assert_eq!(updated.description.as_deref(), Some("now with details"));

    let result = service
        .update_task(
            &member(7),
            model.id,
            UpdateTaskRequest {
                priority: Some(TaskPriority::High),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(TaskServiceError::Forbidden)));
}

#[tokio::test]
async fn unrelated_member_cannot_patch_anything() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Locked", 1, "Pending", "Medium", json!([7]), 5).await;

    let result = service
        .update_task(
            &member(8),
            model.id,
            UpdateTaskRequest {
                description: Some("drive-by".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(TaskServiceError::Forbidden)));
}

#[tokio::test]
async fn out_of_range_progress_is_rejected_before_authorization() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Bounded", 1, "Pending", "Medium", json!([7]), 1).await;

    for progress in [-1, 101] {
        let result = service
            .update_task(
                &member(7),
                model.id,
                UpdateTaskRequest {
                    progress: Some(progress),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(TaskServiceError::Validation(_))));
    }
}

#[tokio::test]
async fn direct_status_writes_are_rejected_while_checklist_exists() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Derived", 1, "Pending", "Medium", json!([7]), 1).await;
    seed_todo(&state.db, model.id, "a", false, 0).await;

    let via_status = service
        .update_task_status(&member(7), model.id, TaskStatus::Completed, None)
        .await;
    assert!(matches!(via_status, Err(TaskServiceError::Validation(_))));

    let via_patch = service
        .update_task(
            &admin(),
            model.id,
            UpdateTaskRequest {
                progress: Some(80),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(via_patch, Err(TaskServiceError::Validation(_))));
}

#[tokio::test]
async fn can_update_status_of_checklist_less_task() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Direct", 1, "Pending", "Medium", json!([7]), 1).await;

    let updated = service
        .update_task_status(&member(7), model.id, TaskStatus::Completed, None)
        .await
        .expect("Failed to update status");
    assert_eq!(updated.status, TaskStatus::Completed);
    // Completing without an explicit progress value pins it to 100.
    assert_eq!(updated.progress, 100);
}

#[tokio::test]
async fn creator_who_is_not_assigned_cannot_update_status() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Asymmetric", 1, "Pending", "Medium", json!([7]), 5).await;

    let result = service
        .update_task_status(&member(5), model.id, TaskStatus::InProgress, None)
        .await;
    assert!(matches!(result, Err(TaskServiceError::Forbidden)));
}

#[tokio::test]
async fn updating_checklist_refreshes_derived_state() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Checklist", 1, "Pending", "Medium", json!([7]), 1).await;

    // Mixed truthy encodings all count the same way.
    let updated = service
        .update_checklist(
            &member(7),
            model.id,
            vec![
                TodoInput {
                    text: "a".to_string(),
                    completed: json!("1"),
                    sort_order: None,
                },
                TodoInput {
                    text: "b".to_string(),
                    completed: json!(false),
                    sort_order: None,
                },
            ],
        )
        .await
        .expect("Failed to update checklist");
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert_eq!(updated.progress, 50);

    let completed = service
        .update_checklist(
            &member(7),
            model.id,
            vec![
                TodoInput {
                    text: "a".to_string(),
                    completed: json!(true),
                    sort_order: None,
                },
                TodoInput {
                    text: "b".to_string(),
                    completed: json!(1),
                    sort_order: None,
                },
            ],
        )
        .await
        .expect("Failed to update checklist");
    assert_eq!(completed.status, TaskStatus::Completed);
    assert_eq!(completed.progress, 100);

    let cleared = service
        .update_checklist(&member(7), model.id, vec![])
        .await
        .expect("Failed to clear checklist");
    assert_eq!(cleared.status, TaskStatus::Pending);
    assert_eq!(cleared.progress, 0);
}

#[tokio::test]
async fn deleting_a_task_cascades_to_its_checklist() {
    let state = setup().await.expect("Failed to setup test context");
    let service = TaskService::new(&state.db);
    let model = seed_task(&state.db, "Doomed", 1, "Pending", "Medium", json!([]), 1).await;
    seed_todo(&state.db, model.id, "a", false, 0).await;
    seed_todo(&state.db, model.id, "b", true, 1).await;

    let result = service.delete_task(&member(7), model.id).await;
    assert!(matches!(result, Err(TaskServiceError::Forbidden)));

    service
        .delete_task(&admin(), model.id)
        .await
        .expect("Failed to delete task");

    let leftover = task_todo::Entity::find()
        .filter(task_todo::Column::TaskId.eq(model.id))
        .all(&state.db)
        .await
        .expect("Failed to query todos");
    assert!(leftover.is_empty());

    let result = service.delete_task(&admin(), model.id).await;
    assert!(matches!(result, Err(TaskServiceError::TaskNotFound(_))));
}
