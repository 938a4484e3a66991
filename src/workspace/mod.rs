//! Per-task workspace isolation
//!
//! Every task gets `<root>/<environment>/tasks/<task>/`, owned by that task
//! alone. It holds the checkout (`repo/`) and the `.strata/` metadata.

pub mod manager;
pub mod record;

pub use manager::{ActiveGuard, ReclaimAction, SweepReport, WorkspaceManager};
pub use record::{TaskOutcome, TaskWorkspace, WorkspaceRecord, WorkspaceStatus};

use crate::cache::content_hash;
use crate::error::{StrataError, StrataResult};

/// Longest directory name a task or environment id maps to
pub const MAX_ID_LEN: usize = 128;

/// Hex chars of the raw id's digest carried by a task slug
pub const SLUG_HASH_LEN: usize = 12;

/// Map an id to a safe single path component.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `_`. Results that would be
/// empty, `.` or `..` are rejected.
pub fn sanitize_id(id: &str) -> StrataResult<String> {
    let sanitized: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_ID_LEN)
        .collect();

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return Err(StrataError::TaskIdInvalid(id.to_string()));
    }
    Ok(sanitized)
}

/// Unique, filesystem-safe name for a task.
///
/// The sanitized id is shortened to fit and suffixed with a digest of the
/// raw id, so ids that sanitize alike (`task/a`, `task_a`) still get
/// different names. Dots become `-`, which keeps the slug usable as a
/// container name and a git ref component too.
pub fn task_slug(task_id: &str) -> StrataResult<String> {
    let prefix: String = sanitize_id(task_id)?
        .chars()
        .take(MAX_ID_LEN - SLUG_HASH_LEN - 1)
        .map(|c| if c == '.' { '-' } else { c })
        .collect();
    let digest = content_hash(task_id.as_bytes());
    Ok(format!("{}-{}", prefix, &digest[..SLUG_HASH_LEN]))
}
