//! Role management. Every handler requires `manage_users`.

use app_error::AppResult;
use app_models::{Claims, Permission, Role, RoleInput, RoleUpdate};
use axum::{Extension, Json, extract::Path, http::StatusCode};

use crate::{extractors::AppJson, state::AppState};

pub async fn create_role(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(input): AppJson<RoleInput>,
) -> AppResult<(StatusCode, Json<Role>)> {
    state
        .roles
        .require_permission(&claims, Permission::ManageUsers)
        .await?;
    let role = state.roles.create(input).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

pub async fn get_role(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_id): Path<String>,
) -> AppResult<Json<Role>> {
    state
        .roles
        .require_permission(&claims, Permission::ManageUsers)
        .await?;
    state.roles.get(&role_id).await.map(Json)
}

pub async fn update_role(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_id): Path<String>,
    AppJson(update): AppJson<RoleUpdate>,
) -> AppResult<Json<Role>> {
    state
        .roles
        .require_permission(&claims, Permission::ManageUsers)
        .await?;
    state.roles.update(&role_id, update).await.map(Json)
}

pub async fn delete_role(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    Path(role_id): Path<String>,
) -> AppResult<Json<Role>> {
    state
        .roles
        .require_permission(&claims, Permission::ManageUsers)
        .await?;
    state.roles.delete(&role_id).await.map(Json)
}
