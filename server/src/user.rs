use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::entities::{task, user};
use crate::norm;
use crate::policy::{Principal, Role};
use crate::task::TaskStatus;

/// A user as exposed to callers. The password hash never leaves the store
/// boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub profile_image_url: Option<String>,
}

impl From<user::Model> for User {
    fn from(model: user::Model) -> Self {
        User {
            id: model.id,
            name: model.name,
            email: model.email,
            role: Role::parse(&model.role),
            profile_image_url: model.profile_image_url,
        }
    }
}

/// A member row in the admin's team listing, with tallies of the tasks
/// assigned to them per status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberOverview {
    pub user: User,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
}

/// Outcome of a user deletion: the removal cascade and the delete itself
/// commit together or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserDeletion {
    pub user_id: i32,
    pub tasks_unassigned: u64,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    /// Hash produced by the caller; hashing is not this crate's concern.
    pub password_hash: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

/// Error type for UserService operations.
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Represents a user that does not exist.
    #[error("User with ID {0} not found")]
    UserNotFound(i32),
    /// Represents an email address that is already registered.
    #[error("Email address '{0}' is already registered")]
    DuplicateEmail(String),
    /// Represents a denied operation. The message stays generic.
    #[error("Forbidden")]
    Forbidden,
    /// Represents a rejected attempt to remove or downgrade the last
    /// remaining admin.
    #[error("At least one admin account must remain")]
    LastAdmin,
    /// Represents a rejected attempt by a principal to delete or downgrade
    /// their own account.
    #[error("Operation may not target the acting account")]
    SelfTarget,
    /// Represents a database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

pub struct UserService<'a> {
    db: &'a DatabaseConnection,
}

impl UserService<'_> {
    pub fn new(db: &DatabaseConnection) -> UserService {
        UserService { db }
    }

    /// Creates a user. The email is normalized to lowercase and must be
    /// unique; the role defaults to member.
    ///
    /// # Arguments
    ///
    /// * `req` - The user to create, with a pre-hashed password.
    ///
    /// # Returns
    ///
    /// A `Result` containing the created `User` if successful, or an error
    /// otherwise.
    #[tracing::instrument(skip(self, req))]
    pub async fn create_user(&self, req: CreateUserRequest) -> Result<User, UserServiceError> {
        let email = req.email.trim().to_lowercase();
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(self.db)
            .await?;
        if existing.is_some() {
            return Err(UserServiceError::DuplicateEmail(email));
        }

        let active_model = user::ActiveModel {
            name: ActiveValue::Set(req.name),
            email: ActiveValue::Set(email),
            password_hash: ActiveValue::Set(req.password_hash),
            role: ActiveValue::Set(req.role.unwrap_or(Role::Member).as_str().to_string()),
            profile_image_url: ActiveValue::Set(req.profile_image_url),
            created_at: ActiveValue::Set(chrono::Utc::now()),
            ..Default::default()
        };
        let created = active_model.insert(self.db).await?;
        Ok(User::from(created))
    }

    /// Retrieves a user by ID.
    #[tracing::instrument(skip(self))]
    pub async fn get_user(&self, id: i32) -> Result<User, UserServiceError> {
        let model = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;
        Ok(User::from(model))
    }

    /// Lists all members together with per-status counts of the tasks
    /// assigned to them. Admin only.
    #[tracing::instrument(skip(self))]
    pub async fn list_users(
        &self,
        principal: &Principal,
    ) -> Result<Vec<MemberOverview>, UserServiceError> {
        if !principal.is_admin() {
            return Err(UserServiceError::Forbidden);
        }

        let members = user::Entity::find()
            .filter(user::Column::Role.eq(Role::Member.as_str()))
            .order_by_asc(user::Column::Id)
            .all(self.db)
            .await?;

        // One pass over the task table covers every member's tallies.
        let tasks = task::Entity::find().all(self.db).await?;
        let mut overviews: Vec<MemberOverview> = members
            .into_iter()
            .map(|model| MemberOverview {
                user: User::from(model),
                pending_tasks: 0,
                in_progress_tasks: 0,
                completed_tasks: 0,
            })
            .collect();
        for task_model in &tasks {
            let assigned = norm::id_list(&task_model.assigned_to);
            let status = TaskStatus::parse(&task_model.status).unwrap_or(TaskStatus::Pending);
            for overview in overviews.iter_mut() {
                if !assigned.contains(&overview.user.id) {
                    continue;
                }
                match status {
                    TaskStatus::Pending => overview.pending_tasks += 1,
                    TaskStatus::InProgress => overview.in_progress_tasks += 1,
                    TaskStatus::Completed => overview.completed_tasks += 1,
                }
            }
        }
        Ok(overviews)
    }

    /// Changes a user's role. Admin only.
    ///
    /// Downgrades are refused when they would target the acting principal
    /// or the last remaining admin; both checks run before any write.
    #[tracing::instrument(skip(self))]
    pub async fn update_role(
        &self,
        principal: &Principal,
        id: i32,
        role: Role,
    ) -> Result<User, UserServiceError> {
        if !principal.is_admin() {
            return Err(UserServiceError::Forbidden);
        }
        let model = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;

        let is_downgrade = Role::parse(&model.role) == Role::Admin && role == Role::Member;
        if is_downgrade {
            if model.id == principal.id {
                return Err(UserServiceError::SelfTarget);
            }
            if self.admin_count().await? <= 1 {
                tracing::warn!("Refused to downgrade the last remaining admin (user {})", id);
                return Err(UserServiceError::LastAdmin);
            }
        }

        let mut active_model: user::ActiveModel = model.into();
        active_model.role = ActiveValue::Set(role.as_str().to_string());
        let updated = active_model.update(self.db).await?;
        Ok(User::from(updated))
    }

    /// Deletes a user and unassigns them from every task. Admin only.
    ///
    /// Self-deletion and deletion of the last remaining admin are refused
    /// before any write. The removal cascade and the user delete run in one
    /// transaction, so a cascade failure fails the whole deletion.
    #[tracing::instrument(skip(self))]
    pub async fn delete_user(
        &self,
        principal: &Principal,
        id: i32,
    ) -> Result<UserDeletion, UserServiceError> {
        if !principal.is_admin() {
            return Err(UserServiceError::Forbidden);
        }
        if id == principal.id {
            return Err(UserServiceError::SelfTarget);
        }
        let model = user::Entity::find_by_id(id)
            .one(self.db)
            .await?
            .ok_or(UserServiceError::UserNotFound(id))?;
        if Role::parse(&model.role) == Role::Admin && self.admin_count().await? <= 1 {
            tracing::warn!("Refused to delete the last remaining admin (user {})", id);
            return Err(UserServiceError::LastAdmin);
        }

        let txn = self.db.begin().await?;
        let tasks_unassigned = scrub_assignments(&txn, id).await?;
        user::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;

        tracing::info!(
            "Deleted user {} and unassigned them from {} task(s)",
            id,
            tasks_unassigned
        );
        Ok(UserDeletion {
            user_id: id,
            tasks_unassigned,
        })
    }

    /// Removes `user_id` from the assignee list of every task that contains
    /// it, preserving the relative order of all other assignees.
    ///
    /// Runs in a single transaction: on any write failure the whole cascade
    /// rolls back.
    ///
    /// # Returns
    ///
    /// A `Result` containing the number of tasks updated.
    #[tracing::instrument(skip(self))]
    pub async fn remove_user_from_all_tasks(&self, user_id: i32) -> Result<u64, UserServiceError> {
        let txn = self.db.begin().await?;
        let updated = scrub_assignments(&txn, user_id).await?;
        txn.commit().await?;
        Ok(updated)
    }

    async fn admin_count(&self) -> Result<u64, UserServiceError> {
        let count = user::Entity::find()
            .filter(user::Column::Role.eq(Role::Admin.as_str()))
            .count(self.db)
            .await?;
        Ok(count)
    }
}

/// The cascade core: rewrites the assignee list of every task that contains
/// `user_id`, comparing numerically so string-encoded ids from older rows
/// still match. The filtered list is written back as a concrete list, never
/// null, and rows whose membership does not change are left untouched.
async fn scrub_assignments<C>(conn: &C, user_id: i32) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    let tasks = task::Entity::find().all(conn).await?;
    let mut updated: u64 = 0;
    for model in tasks {
        let assigned = norm::id_list(&model.assigned_to);
        if !assigned.contains(&user_id) {
            continue;
        }
        let filtered: Vec<i32> = assigned.into_iter().filter(|id| *id != user_id).collect();
        let mut active_model: task::ActiveModel = model.into();
        active_model.assigned_to = ActiveValue::Set(serde_json::json!(filtered));
        active_model.update(conn).await?;
        updated += 1;
    }
    Ok(updated)
}
