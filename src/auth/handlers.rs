use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::audit;
use crate::auth::dto::{
    AuthResponse, ConnectRequest, ConnectResponse, LoginRequest, PublicUser, RefreshRequest,
    RegisterRequest,
};
use crate::auth::services::{
    hash_password, is_valid_phone, is_valid_username, verify_password, AuthActor, JwtKeys,
};
use crate::error::ApiError;
use crate::policy::Role;
use crate::sharing::services as sharing;
use crate::state::AppState;
use crate::users::repo::{NewUser, User};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/connect", post(connect))
        .route("/auth/profile", get(profile))
}

fn public(user: &User) -> PublicUser {
    PublicUser {
        id: user.id,
        username: user.username.clone(),
        phone_number: user.phone_number.clone(),
        full_name: user.full_name.clone(),
        role: user.role,
        shared_code: user.shared_code.clone(),
    }
}

fn token_pair(keys: &JwtKeys, user: &User) -> Result<(String, String), ApiError> {
    let access = keys.sign_access(user.id, user.role)?;
    let refresh = keys.sign_refresh(user.id, user.role)?;
    Ok((access, refresh))
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    if !is_valid_username(&payload.username) {
        return Err(ApiError::validation("Invalid username"));
    }
    if !is_valid_phone(&payload.phone_number) {
        return Err(ApiError::validation("Invalid phone number"));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::validation("Password too short"));
    }
    if payload.full_name.trim().is_empty() {
        return Err(ApiError::validation("Full name is required"));
    }

    if User::find_by_username(&state.db, &payload.username)
        .await?
        .is_some()
        || User::find_by_phone(&state.db, &payload.phone_number)
            .await?
            .is_some()
    {
        warn!(username = %payload.username, "registration with taken username or phone");
        return Err(ApiError::validation(
            "Username or phone number already exists",
        ));
    }

    // Main users get a personal group tag at registration; shared users are
    // expected to join through /auth/connect instead.
    let registration_tag = match payload.role {
        Role::MainUser => Some(sharing::unique_registration_tag(&state.db).await?),
        Role::SharedUser => None,
    };

    let password_hash = hash_password(&payload.password)?;
    let user = User::create(
        &state.db,
        &NewUser {
            username: &payload.username,
            phone_number: &payload.phone_number,
            password_hash: &password_hash,
            full_name: &payload.full_name,
            role: payload.role,
            shared_code: registration_tag.as_deref(),
        },
    )
    .await?;

    audit::record(
        &state.db,
        user.id,
        "register",
        "users",
        Some(user.id),
        None,
        serde_json::to_value(&user).ok(),
    )
    .await;

    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = token_pair(&keys, &user)?;

    info!(user_id = %user.id, username = %user.username, role = ?user.role, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token,
            refresh_token,
            user: public(&user),
        }),
    ))
}

#[instrument(skip(state, payload))]
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = User::find_by_username(&state.db, &payload.username)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !user.is_active {
        warn!(user_id = %user.id, "login attempt on deactivated account");
        return Err(ApiError::AccessDenied);
    }

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login with invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = token_pair(&keys, &user)?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: public(&user),
    }))
}

#[instrument(skip(state, payload))]
async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|_| ApiError::InvalidCredentials)?;

    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .filter(|u| u.is_active)
        .ok_or(ApiError::InvalidCredentials)?;

    let (access_token, refresh_token) = token_pair(&keys, &user)?;
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: public(&user),
    }))
}

/// Joins a household through a single-use shared code.
#[instrument(skip(state, payload))]
async fn connect(
    State(state): State<AppState>,
    Json(payload): Json<ConnectRequest>,
) -> Result<(StatusCode, Json<ConnectResponse>), ApiError> {
    let (user, main_user) = sharing::join_with_code(&state.db, &payload).await?;

    audit::record(
        &state.db,
        user.id,
        "connect_with_shared_code",
        "users",
        Some(user.id),
        None,
        serde_json::to_value(&user).ok(),
    )
    .await;

    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = token_pair(&keys, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(ConnectResponse {
            access_token,
            refresh_token,
            user: public(&user),
            main_user,
        }),
    ))
}

#[instrument(skip(state))]
async fn profile(
    State(state): State<AppState>,
    AuthActor(actor): AuthActor,
) -> Result<Json<PublicUser>, ApiError> {
    let user = User::find_by_id(&state.db, actor.id)
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    Ok(Json(public(&user)))
}
