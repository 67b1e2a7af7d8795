//! Repository traits the auth core depends on, with SurrealDB implementations.

use app_error::{AppError, AppResult};
use app_models::{PermissionSet, Role, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use surrealdb::sql::Thing;

use crate::{Database, DbService, record_key};

pub const USER_TABLE: &str = "users";
pub const ROLE_TABLE: &str = "roles";

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Lookup by login identifier (username).
    async fn find_by_identifier(&self, username: &str) -> AppResult<Option<User>>;
    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn create(&self, user: User) -> AppResult<User>;
    /// Writes the profile fields. The stored session is left as it is.
    async fn update(&self, user: User) -> AppResult<User>;
    /// Replaces the session id. With `expected`, the write only happens while
    /// the stored session still equals it; returns whether anything was written.
    async fn set_session(
        &self,
        id: &str,
        expected: Option<&str>,
        session_id: Option<&str>,
    ) -> AppResult<bool>;
    async fn count_with_role(&self, role_id: &str) -> AppResult<u64>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn create(&self, role: Role) -> AppResult<Role>;
    async fn find_by_id(&self, id: &str) -> AppResult<Option<Role>>;
    async fn find_by_name(&self, name: &str) -> AppResult<Option<Role>>;
    async fn update(&self, role: Role) -> AppResult<Role>;
    /// Returns whether a role was removed.
    async fn delete(&self, id: &str) -> AppResult<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    username: String,
    email: String,
    password_hash: String,
    role_id: String,
    additional_info: Option<String>,
    is_active: bool,
    is_superuser: bool,
    is_verified: bool,
    registered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    // Written only through `set_session`
    #[serde(default, skip_serializing)]
    session_id: Option<String>,
}

impl From<User> for UserRecord {
    fn from(user: User) -> Self {
        Self {
            id: None,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role_id: user.role_id,
            additional_info: user.additional_info,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            is_verified: user.is_verified,
            registered_at: user.registered_at,
            updated_at: user.updated_at,
            session_id: user.session_id,
        }
    }
}

/// Storage record to domain type.
trait IntoModel {
    type Model;
    fn into_model(self) -> AppResult<Self::Model>;
}

impl IntoModel for UserRecord {
    type Model = User;

    fn into_model(self) -> AppResult<User> {
        let id = self.id.as_ref().map(record_key).ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("User record is missing its id"))
        })?;

        Ok(User {
            id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            role_id: self.role_id,
            additional_info: self.additional_info,
            is_active: self.is_active,
            is_superuser: self.is_superuser,
            is_verified: self.is_verified,
            registered_at: self.registered_at,
            updated_at: self.updated_at,
            session_id: self.session_id,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RoleRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    name: String,
    permissions: PermissionSet,
}

impl From<Role> for RoleRecord {
    fn from(role: Role) -> Self {
        Self {
            id: None,
            name: role.name,
            permissions: role.permissions,
        }
    }
}

impl IntoModel for RoleRecord {
    type Model = Role;

    fn into_model(self) -> AppResult<Role> {
        let id = self.id.as_ref().map(record_key).ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("Role record is missing its id"))
        })?;

        Ok(Role {
            id,
            name: self.name,
            permissions: self.permissions,
        })
    }
}

fn first<R: IntoModel>(records: Vec<R>) -> AppResult<Option<R::Model>> {
    records.into_iter().next().map(R::into_model).transpose()
}

fn written<R: IntoModel>(record: Option<R>, table: &str, key: &str) -> AppResult<R::Model> {
    record
        .ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "Database did not return the {} record '{}'",
                table,
                key
            ))
        })
        .and_then(R::into_model)
}

#[derive(Clone)]
pub struct SurrealUserStore {
    users: DbService<UserRecord>,
}

impl SurrealUserStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            users: DbService::new(db, USER_TABLE),
        }
    }
}

#[async_trait]
impl UserStore for SurrealUserStore {
    async fn find_by_identifier(&self, username: &str) -> AppResult<Option<User>> {
        first(self.users.get_records_by_field("username", username).await?)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>> {
        self.users
            .get_record_by_id(id)
            .await?
            .map(UserRecord::into_model)
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        first(self.users.get_records_by_field("email", email).await?)
    }

    async fn create(&self, user: User) -> AppResult<User> {
        let key = user.id.clone();
        let record = self.users.create_record(&key, user.into()).await?;
        written(record, USER_TABLE, &key)
    }

    async fn update(&self, user: User) -> AppResult<User> {
        let key = user.id.clone();
        let patch = serde_json::to_value(UserRecord::from(user))
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to encode user: {}", e)))?;
        let record = self.users.merge_record(&key, patch, None).await?;
        written(record, USER_TABLE, &key)
    }

    async fn set_session(
        &self,
        id: &str,
        expected: Option<&str>,
        session_id: Option<&str>,
    ) -> AppResult<bool> {
        let patch = serde_json::json!({ "session_id": session_id });
        let guard = expected.map(|current| ("session_id", serde_json::Value::from(current)));
        Ok(self.users.merge_record(id, patch, guard).await?.is_some())
    }

    async fn count_with_role(&self, role_id: &str) -> AppResult<u64> {
        self.users.count_by_field("role_id", role_id).await
    }
}

#[derive(Clone)]
pub struct SurrealRoleStore {
    roles: DbService<RoleRecord>,
}

impl SurrealRoleStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            roles: DbService::new(db, ROLE_TABLE),
        }
    }
}

#[async_trait]
impl RoleStore for SurrealRoleStore {
    async fn create(&self, role: Role) -> AppResult<Role> {
        let key = role.id.clone();
        let record = self.roles.create_record(&key, role.into()).await?;
        written(record, ROLE_TABLE, &key)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<Role>> {
        self.roles
            .get_record_by_id(id)
            .await?
            .map(RoleRecord::into_model)
            .transpose()
    }

    async fn find_by_name(&self, name: &str) -> AppResult<Option<Role>> {
        first(self.roles.get_records_by_field("name", name).await?)
    }

    async fn update(&self, role: Role) -> AppResult<Role> {
        let key = role.id.clone();
        let record = self.roles.update_record(&key, role.into()).await?;
        written(record, ROLE_TABLE, &key)
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        Ok(self.roles.delete_record(id).await?.is_some())
    }
}
