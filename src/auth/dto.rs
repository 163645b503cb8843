use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::Role;

/// Request body for registering a household account or a standalone user.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub phone_number: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for joining a household with a shared code.
#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub shared_code: String,
    pub username: String,
    pub phone_number: String,
    pub password: String,
    pub full_name: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub phone_number: String,
    pub full_name: String,
    pub role: Role,
    pub shared_code: Option<String>,
}

/// Response returned after login, register or refresh.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
}

/// The issuing main user, echoed back when a shared user joins.
#[derive(Debug, Serialize)]
pub struct MainUserSummary {
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
}

/// Response returned after joining with a shared code.
#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: PublicUser,
    pub main_user: MainUserSummary,
}
