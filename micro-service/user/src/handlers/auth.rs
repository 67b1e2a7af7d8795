use app_authentication::AuthServiceTrait;
use app_error::AppResult;
use app_middleware::api_middleware::ClientAddress;
use app_models::{
    Claims, LoginInput, RefreshInput, RegisterInput, TokenPair, UpdateProfileInput, UserProfile,
};
use axum::{Extension, Json, http::StatusCode};

use crate::{extractors::AppJson, state::AppState};

pub async fn register(
    Extension(state): Extension<AppState>,
    AppJson(input): AppJson<RegisterInput>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let profile = state.auth.register(input).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

pub async fn login(
    Extension(state): Extension<AppState>,
    ClientAddress(client): ClientAddress,
    AppJson(input): AppJson<LoginInput>,
) -> AppResult<Json<TokenPair>> {
    state.auth.login(input, &client).await.map(Json)
}

pub async fn refresh(
    Extension(state): Extension<AppState>,
    AppJson(input): AppJson<RefreshInput>,
) -> AppResult<Json<TokenPair>> {
    state.auth.refresh(&input.refresh_token).await.map(Json)
}

pub async fn me(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<UserProfile>> {
    state.auth.current_user(&claims).await.map(Json)
}

pub async fn update_me(
    Extension(state): Extension<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(input): AppJson<UpdateProfileInput>,
) -> AppResult<Json<UserProfile>> {
    state.auth.update_profile(&claims, input).await.map(Json)
}
