use app_database::{RoleStore, UserStore};
use app_error::{AppError, AppResult, not_found_error, resource_exists_error};
use app_middleware::validation::{sanitize_string, validate_role_name};
use app_models::{
    ADMIN_ROLE, Claims, DEFAULT_ROLE, Permission, PermissionSet, Role, RoleInput, RoleUpdate,
    User,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::PermissionChecker;

/// Role CRUD plus the permission guard for role-gated operations.
pub struct RoleService {
    roles: Arc<dyn RoleStore>,
    users: Arc<dyn UserStore>,
}

fn parse_permissions(names: &[String]) -> AppResult<PermissionSet> {
    PermissionSet::parse(names).map_err(|e| AppError::validation("permissions", &e.to_string()))
}

impl RoleService {
    pub fn new(roles: Arc<dyn RoleStore>, users: Arc<dyn UserStore>) -> Self {
        Self { roles, users }
    }

    /// Creates the `user` and `admin` roles when they are missing.
    pub async fn ensure_default_roles(&self) -> AppResult<()> {
        let defaults = [
            (DEFAULT_ROLE, PermissionSet::new()),
            (ADMIN_ROLE, [Permission::ManageUsers].into_iter().collect()),
        ];

        for (name, permissions) in defaults {
            if self.roles.find_by_name(name).await?.is_none() {
                self.roles
                    .create(Role::new(name.to_string(), permissions))
                    .await?;
                info!(role = name, "Seeded default role");
            }
        }
        Ok(())
    }

    /// Assigns the role called `role_name` to an existing user. The new role
    /// shows up in that user's tokens from the next refresh on.
    pub async fn assign_role(&self, username: &str, role_name: &str) -> AppResult<User> {
        let role = match self.roles.find_by_name(role_name).await? {
            Some(role) => role,
            None => return not_found_error!("Role", role_name),
        };
        let mut user = match self.users.find_by_identifier(username).await? {
            Some(user) => user,
            None => return not_found_error!("User", username),
        };

        if user.role_id != role.id {
            user.role_id = role.id;
            user.updated_at = Utc::now();
            user = self.users.update(user).await?;
            info!(user_id = %user.id, role = role_name, "Role assigned");
        }
        Ok(user)
    }

    /// Resolves the role named in the token and checks it holds `permission`.
    pub async fn require_permission(&self, claims: &Claims, permission: Permission) -> AppResult<()> {
        let role = match claims.role.as_deref() {
            Some(role_id) => self.roles.find_by_id(role_id).await?,
            None => None,
        };

        if PermissionChecker::authorize(role.as_ref(), permission) {
            Ok(())
        } else {
            warn!(subject = %claims.sub, %permission, "Permission denied");
            Err(AppError::missing_permission(permission.as_str()))
        }
    }

    pub async fn create(&self, input: RoleInput) -> AppResult<Role> {
        let name = sanitize_string(&input.name);
        validate_role_name(&name)?;
        let permissions = parse_permissions(&input.permissions)?;

        if self.roles.find_by_name(&name).await?.is_some() {
            return resource_exists_error!("Role", "name", &name);
        }

        let role = self.roles.create(Role::new(name, permissions)).await?;
        info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    pub async fn get(&self, id: &str) -> AppResult<Role> {
        match self.roles.find_by_id(id).await? {
            Some(role) => Ok(role),
            None => not_found_error!("Role", id),
        }
    }

    /// Partial update of name and permissions.
    pub async fn update(&self, id: &str, update: RoleUpdate) -> AppResult<Role> {
        let mut role = self.get(id).await?;

        if let Some(name) = update.name.as_deref().map(sanitize_string) {
            if name != role.name {
                if role.name == DEFAULT_ROLE {
                    return Err(AppError::ResourceInUse(format!(
                        "The default role '{}' cannot be renamed.",
                        DEFAULT_ROLE
                    )));
                }
                validate_role_name(&name)?;
                if self.roles.find_by_name(&name).await?.is_some() {
                    return resource_exists_error!("Role", "name", &name);
                }
                role.name = name;
            }
        }

        if let Some(permissions) = update.permissions {
            role.permissions = parse_permissions(&permissions)?;
        }

        let role = self.roles.update(role).await?;
        info!(role_id = %role.id, "Role updated");
        Ok(role)
    }

    /// Refuses to delete the default role or any role still assigned to a
    /// user. Returns the removed role.
    pub async fn delete(&self, id: &str) -> AppResult<Role> {
        let role = self.get(id).await?;

        if role.name == DEFAULT_ROLE {
            return Err(AppError::ResourceInUse(format!(
                "The default role '{}' cannot be deleted.",
                DEFAULT_ROLE
            )));
        }

        let assigned = self.users.count_with_role(&role.id).await?;
        if assigned > 0 {
            return Err(AppError::ResourceInUse(format!(
                "Role '{}' is still assigned to {} user(s).",
                role.name, assigned
            )));
        }

        if !self.roles.delete(&role.id).await? {
            return not_found_error!("Role", id);
        }

        info!(role_id = %role.id, name = %role.name, "Role deleted");
        Ok(role)
    }
}
