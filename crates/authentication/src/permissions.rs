use app_models::{Permission, Role};

/// Role based authorization. Fails closed: no role means no permission.
pub struct PermissionChecker;

impl PermissionChecker {
    pub fn authorize(role: Option<&Role>, required: Permission) -> bool {
        role.is_some_and(|role| role.permissions.contains(required))
    }
}
