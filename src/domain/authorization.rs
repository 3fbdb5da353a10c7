//! Roles, permissions, and the three authorization gates.
//!
//! A command passes when the role gate, the permission gate, and (where the
//! command targets a concrete resource) the resource gate all pass.
//! Failures carry the stable `FORBIDDEN` code and never reveal whether the
//! target exists.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::error::{AppError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SystemAdmin,
    TenantAdmin,
    ProjectManager,
    Member,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SystemAdmin => "SYSTEM_ADMIN",
            Role::TenantAdmin => "TENANT_ADMIN",
            Role::ProjectManager => "PROJECT_MANAGER",
            Role::Member => "MEMBER",
            Role::Guest => "GUEST",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "SYSTEM_ADMIN" => Some(Role::SystemAdmin),
            "TENANT_ADMIN" => Some(Role::TenantAdmin),
            "PROJECT_MANAGER" => Some(Role::ProjectManager),
            "MEMBER" => Some(Role::Member),
            "GUEST" => Some(Role::Guest),
            _ => None,
        }
    }

    /// Default permission grants for the role. Per-user overrides are
    /// stored on the user row and merged by `effective_permissions`.
    pub fn default_permissions(&self) -> Vec<String> {
        let perms: &[&str] = match self {
            Role::SystemAdmin => &["*"],
            Role::TenantAdmin => &["tasks.*", "users.manage", "reports.view", "tenant.configure"],
            Role::ProjectManager => &[
                "tasks.read",
                "tasks.create",
                "tasks.update",
                "tasks.assign",
                "reports.view",
            ],
            Role::Member => &["tasks.read", "tasks.create", "tasks.update"],
            Role::Guest => &["tasks.read"],
        };
        perms.iter().map(|p| p.to_string()).collect()
    }
}

// Permission strings used by commands and queries.
pub const TASKS_READ: &str = "tasks.read";
pub const TASKS_CREATE: &str = "tasks.create";
pub const TASKS_UPDATE: &str = "tasks.update";
pub const TASKS_DELETE: &str = "tasks.delete";
pub const TASKS_ASSIGN: &str = "tasks.assign";
pub const REPORTS_VIEW: &str = "reports.view";
pub const USERS_MANAGE: &str = "users.manage";
pub const TENANT_CONFIGURE: &str = "tenant.configure";

/// Whether a granted permission string satisfies a required one.
/// `*` grants everything; `tasks.*` grants every `tasks.` permission.
pub fn permission_grants(granted: &str, required: &str) -> bool {
    if granted == "*" || granted == required {
        return true;
    }
    match granted.strip_suffix(".*") {
        Some(prefix) => required
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.')),
        None => false,
    }
}

/// Union of role defaults and per-user overrides, deduplicated.
pub fn effective_permissions(roles: &[Role], overrides: &[String]) -> Vec<String> {
    let mut perms: Vec<String> = roles.iter().flat_map(|r| r.default_permissions()).collect();
    for o in overrides {
        if !perms.contains(o) {
            perms.push(o.clone());
        }
    }
    perms
}

/// Role gate: the caller must hold at least one of the listed roles.
pub fn require_any_role(user_roles: &[Role], required: &[Role]) -> Result<()> {
    if required.is_empty() || user_roles.iter().any(|r| required.contains(r)) {
        Ok(())
    } else {
        Err(AppError::forbidden("Insufficient role"))
    }
}

/// Permission gate: the caller's effective permissions must grant the
/// required permission, wildcards included.
pub fn require_permission(user_permissions: &[String], required: &str) -> Result<()> {
    if user_permissions
        .iter()
        .any(|granted| permission_grants(granted, required))
    {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "Missing required permission: {required}"
        )))
    }
}

/// Resource gate for tasks: assignee, creator, tenant/system admins, and
/// department colleagues holding `tasks.read` may touch the task.
#[allow(clippy::too_many_arguments)]
pub fn can_access_task(
    user_id: Uuid,
    user_roles: &[Role],
    user_permissions: &[String],
    user_department_id: Option<Uuid>,
    assigned_to: Option<Uuid>,
    created_by: Uuid,
    task_department_id: Option<Uuid>,
) -> bool {
    if user_roles.contains(&Role::TenantAdmin) || user_roles.contains(&Role::SystemAdmin) {
        return true;
    }
    if assigned_to == Some(user_id) || created_by == user_id {
        return true;
    }
    if let (Some(ud), Some(td)) = (user_department_id, task_department_id) {
        if ud == td
            && user_permissions
                .iter()
                .any(|granted| permission_grants(granted, TASKS_READ))
        {
            return true;
        }
    }
    false
}
