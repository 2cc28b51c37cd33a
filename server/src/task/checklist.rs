//! Checklist-derived task state.
//!
//! When a task carries a checklist, its status and progress are computed
//! from the items rather than written directly. The derivation is total:
//! an empty checklist yields Pending at 0%.

use serde_json::Value;

use super::TaskStatus;

/// Status and progress derived from a checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecklistState {
    pub status: TaskStatus,
    pub progress: i32,
}

/// Computes `{status, progress}` from the completion flags of a checklist.
///
/// progress is `round(100 * done / total)`, or 0 for an empty list. The
/// status is Completed only when every item of a non-empty list is done,
/// In Progress when at least one but not all are, and Pending otherwise.
pub fn derive_checklist_state<I>(completed_flags: I) -> ChecklistState
where
    I: IntoIterator<Item = bool>,
{
    let mut total: u32 = 0;
    let mut done: u32 = 0;
    for completed in completed_flags {
        total += 1;
        if completed {
            done += 1;
        }
    }

    if total == 0 {
        return ChecklistState {
            status: TaskStatus::Pending,
            progress: 0,
        };
    }

    let progress = (100.0 * f64::from(done) / f64::from(total)).round() as i32;
    let status = if done == total {
        TaskStatus::Completed
    } else if done > 0 {
        TaskStatus::InProgress
    } else {
        TaskStatus::Pending
    };

    ChecklistState { status, progress }
}

/// Normalizes the loose encodings of a checklist completion flag.
///
/// Clients send `true`/`false`, `1`/`0`, `"true"`, or `"1"`; all four
/// truthy spellings count identically. Anything else is not completed.
pub fn completion_flag(raw: &Value) -> bool {
    match raw {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64() == Some(1.0),
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1"
        }
        _ => false,
    }
}
