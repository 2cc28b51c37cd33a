//! Authorization policy for task operations.
//!
//! Every predicate here is a pure function over already-loaded data: the
//! acting principal is threaded in explicitly rather than read from ambient
//! request state, and nothing in this module touches the store.

use serde::{Deserialize, Serialize};

/// Role of an authenticated principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// Parses a stored role string. Unrecognized values fall back to the
    /// least-privileged role.
    pub fn parse(raw: &str) -> Role {
        match raw {
            "admin" => Role::Admin,
            _ => Role::Member,
        }
    }
}

/// The authenticated identity acting on a request, as populated by the
/// upstream authentication middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: i32,
    pub role: Role,
}

impl Principal {
    pub fn new(id: i32, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// The slice of a task the policy needs to reach a decision.
#[derive(Debug, Clone, Copy)]
pub struct TaskSnapshot<'a> {
    pub created_by: i32,
    pub assigned_to: &'a [i32],
}

impl TaskSnapshot<'_> {
    fn is_assignee(&self, principal: &Principal) -> bool {
        self.assigned_to.contains(&principal.id)
    }

    fn is_creator(&self, principal: &Principal) -> bool {
        self.created_by == principal.id
    }
}

/// Patchable task fields, as named by update requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    Title,
    Description,
    Priority,
    Status,
    DueDate,
    AssignedTo,
    Progress,
    Attachments,
}

/// Whether `principal` may read the task or operate on its files
/// (list, upload, delete, edit tags).
///
/// Admins always may; otherwise membership in the assignee list or
/// authorship suffices. The two non-admin facts are independent, so their
/// order of evaluation does not matter.
pub fn can_access_task(principal: &Principal, task: &TaskSnapshot) -> bool {
    principal.is_admin() || task.is_assignee(principal) || task.is_creator(principal)
}

/// Whether `principal` may patch `field` on the task.
///
/// Admins may patch any recognized field. An assignee or the creator is
/// limited to description, attachments, and progress. Everyone else is
/// denied outright.
pub fn can_mutate_task_field(principal: &Principal, task: &TaskSnapshot, field: TaskField) -> bool {
    if principal.is_admin() {
        return true;
    }
    if !(task.is_assignee(principal) || task.is_creator(principal)) {
        return false;
    }
    matches!(
        field,
        TaskField::Description | TaskField::Attachments | TaskField::Progress
    )
}

/// Whether `principal` may change the task's status through the dedicated
/// status operation.
///
/// Only admins and assignees qualify. A creator who is not assigned cannot,
/// even though the same creator may patch progress through the full update
/// path.
pub fn can_update_status(principal: &Principal, task: &TaskSnapshot) -> bool {
    principal.is_admin() || task.is_assignee(principal)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Principal {
        Principal::new(1, Role::Admin)
    }

    fn member(id: i32) -> Principal {
        Principal::new(id, Role::Member)
    }

    #[test]
    fn admin_can_access_any_task() {
        let task = TaskSnapshot {
            created_by: 50,
            assigned_to: &[60, 70],
        };
        assert!(can_access_task(&admin(), &task));
    }

    #[test]
    fn assignee_and_creator_can_access() {
        let task = TaskSnapshot {
            created_by: 5,
            assigned_to: &[7, 9],
        };
        assert!(can_access_task(&member(7), &task));
        assert!(can_access_task(&member(5), &task));
    }

    #[test]
    fn unrelated_member_cannot_access() {
        let task = TaskSnapshot {
            created_by: 5,
            assigned_to: &[7, 9],
        };
        assert!(!can_access_task(&member(8), &task));
    }

    #[test]
    fn assignee_field_patches_are_restricted() {
        let task = TaskSnapshot {
            created_by: 5,
            assigned_to: &[7],
        };
        let assignee = member(7);
        assert!(can_mutate_task_field(&assignee, &task, TaskField::Description));
        assert!(can_mutate_task_field(&assignee, &task, TaskField::Attachments));
        assert!(can_mutate_task_field(&assignee, &task, TaskField::Progress));
        assert!(!can_mutate_task_field(&assignee, &task, TaskField::Priority));
        assert!(!can_mutate_task_field(&assignee, &task, TaskField::Title));
        assert!(!can_mutate_task_field(&assignee, &task, TaskField::DueDate));
        assert!(!can_mutate_task_field(&assignee, &task, TaskField::AssignedTo));
    }

    #[test]
    fn admin_may_patch_every_field() {
        let task = TaskSnapshot {
            created_by: 5,
            assigned_to: &[],
        };
        for field in [
            TaskField::Title,
            TaskField::Description,
            TaskField::Priority,
            TaskField::Status,
            TaskField::DueDate,
            TaskField::AssignedTo,
            TaskField::Progress,
            TaskField::Attachments,
        ] {
            assert!(can_mutate_task_field(&admin(), &task, field));
        }
    }

    #[test]
    fn status_change_requires_assignment_not_authorship() {
        // The creator may patch progress through the full update path but
        // may not change status unless they are also assigned.
        let task = TaskSnapshot {
            created_by: 5,
            assigned_to: &[7],
        };
        let creator = member(5);
        assert!(can_mutate_task_field(&creator, &task, TaskField::Progress));
        assert!(!can_update_status(&creator, &task));
        assert!(can_update_status(&member(7), &task));
        assert!(can_update_status(&admin(), &task));
    }

    #[test]
    fn unknown_role_strings_parse_as_member() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("member"), Role::Member);
        assert_eq!(Role::parse("superuser"), Role::Member);
    }
}
