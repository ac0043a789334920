use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    error::AppResult,
    state::AppState,
    users::{
        dto::{
            PublicUser, SignupRequest, UpdatePasswordRequest, UpdateProfileRequest, VerifyRequest,
            VerifyResponse,
        },
        extractors::{JsonBody, UserId},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/user/signup", post(signup))
        .route("/user/verify", post(verify))
        .route("/user/:id", put(update_profile).delete(delete_user))
        .route("/user/:id/password", put(update_password))
        .route("/users", get(list_users))
        .route("/users/get", get(list_users))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> AppResult<(StatusCode, HeaderMap, Json<PublicUser>)> {
    let user = state
        .accounts
        .create(&payload.username, payload.password, payload.email)
        .await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/user/{}", user.id).parse::<HeaderValue>() {
        headers.insert(header::LOCATION, location);
    }

    Ok((StatusCode::CREATED, headers, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<VerifyRequest>,
) -> AppResult<Json<VerifyResponse>> {
    let verified = state
        .accounts
        .verify_credentials(&payload.username, payload.password)
        .await?;
    Ok(Json(VerifyResponse { verified }))
}

#[instrument(skip(state))]
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<PublicUser>>> {
    let users = state.accounts.list_all().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    UserId(id): UserId,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = state.accounts.update_profile(id, payload.into()).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    UserId(id): UserId,
    JsonBody(payload): JsonBody<UpdatePasswordRequest>,
) -> AppResult<Json<PublicUser>> {
    let user = state.accounts.update_password(id, payload.password).await?;
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(State(state): State<AppState>, UserId(id): UserId) -> AppResult<StatusCode> {
    state.accounts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
