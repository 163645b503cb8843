use std::collections::HashSet;

use rand::Rng;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::dto::{ConnectRequest, MainUserSummary};
use crate::auth::services::{hash_password, is_valid_phone, is_valid_username};
use crate::error::ApiError;
use crate::policy::{Actor, Role};
use crate::sharing::repo::SharedCode;
use crate::users::repo::{NewUser, User};

const CODE_LEN: usize = 8;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// How many unique-violation retries before giving up on code generation.
/// With 36^8 possible codes a single retry is already rare.
const MAX_GENERATION_ATTEMPTS: usize = 16;

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}

/// A code can be consumed only while unused and unexpired.
pub fn is_joinable(is_used: bool, expires_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    !is_used && expires_at.map_or(true, |exp| exp > now)
}

/// Issues a fresh invitation for a main user. Uniqueness is enforced by the
/// shared_codes.code constraint; collisions regenerate.
pub async fn issue_code(
    db: &PgPool,
    main_user_id: Uuid,
    ttl_days: i64,
) -> Result<SharedCode, ApiError> {
    let expires_at = Some(OffsetDateTime::now_utc() + Duration::days(ttl_days));
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let code = generate_code();
        match SharedCode::insert(db, &code, main_user_id, expires_at).await {
            Ok(created) => {
                info!(main_user_id = %main_user_id, code = %created.code, "shared code issued");
                return Ok(created);
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!("shared code collision, regenerating");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Conflict(
        "Could not generate a unique shared code".into(),
    ))
}

/// Picks a personal group tag for a freshly registered main user, unique
/// across users.shared_code values.
pub async fn unique_registration_tag(db: &PgPool) -> Result<String, ApiError> {
    for _ in 0..MAX_GENERATION_ATTEMPTS {
        let code = generate_code();
        if User::find_by_shared_code(db, &code).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ApiError::Conflict(
        "Could not generate a unique shared code".into(),
    ))
}

/// Consumes an invitation: creates the shared user bound permanently to the
/// code and marks the code used, all in one transaction so a code cannot be
/// double-spent.
pub async fn join_with_code(
    db: &PgPool,
    req: &ConnectRequest,
) -> Result<(User, MainUserSummary), ApiError> {
    if !is_valid_username(&req.username) {
        return Err(ApiError::validation("Invalid username"));
    }
    if !is_valid_phone(&req.phone_number) {
        return Err(ApiError::validation("Invalid phone number"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::validation("Password too short"));
    }

    // Pre-checks are advisory; the unique constraints and the row lock
    // below are the real guard.
    if User::find_by_username(db, &req.username).await?.is_some()
        || User::find_by_phone(db, &req.phone_number).await?.is_some()
    {
        return Err(ApiError::validation(
            "Username or phone number already exists",
        ));
    }
    let code = SharedCode::find_by_code(db, &req.shared_code)
        .await?
        .ok_or(ApiError::InvalidCode)?;
    if !is_joinable(code.is_used, code.expires_at, OffsetDateTime::now_utc()) {
        return Err(ApiError::InvalidCode);
    }

    let password_hash = hash_password(&req.password)?;

    let mut tx = db.begin().await.map_err(ApiError::from)?;

    let resolution = SharedCode::resolve_locked(&mut tx, &req.shared_code)
        .await?
        .ok_or(ApiError::InvalidCode)?;

    let user = User::create(
        &mut *tx,
        &NewUser {
            username: &req.username,
            phone_number: &req.phone_number,
            password_hash: &password_hash,
            full_name: &req.full_name,
            role: Role::SharedUser,
            shared_code: Some(&req.shared_code),
        },
    )
    .await?;

    SharedCode::mark_used(&mut *tx, &req.shared_code, user.id).await?;

    tx.commit().await.map_err(ApiError::from)?;

    info!(user_id = %user.id, main_user_id = %resolution.main_user_id, "shared user joined");

    Ok((
        user,
        MainUserSummary {
            id: resolution.main_user_id,
            username: resolution.main_username,
            full_name: resolution.main_full_name,
        },
    ))
}

/// The main user behind the requester's household: the requester themselves
/// for a main user, the code issuer for a shared user.
pub async fn household_main(db: &PgPool, actor: &Actor) -> Result<Option<Uuid>, ApiError> {
    match actor.role {
        Role::MainUser => Ok(Some(actor.id)),
        Role::SharedUser => Ok(SharedCode::issuer_of(db, actor.id).await?),
    }
}

/// The set of user ids the requester may see: a main user's whole group, or
/// for a shared user the entire household behind their group tag.
pub async fn members_visible_to(db: &PgPool, actor: &Actor) -> Result<HashSet<Uuid>, ApiError> {
    let main_id = household_main(db, actor).await?;
    let mut members: HashSet<Uuid> = match main_id {
        Some(id) => SharedCode::group_member_ids(db, id).await?.into_iter().collect(),
        None => HashSet::new(),
    };
    members.insert(actor.id);
    Ok(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_eight_uppercase_alphanumerics() {
        for _ in 0..64 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LEN);
            assert!(code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn used_codes_are_not_joinable() {
        let now = OffsetDateTime::now_utc();
        assert!(!is_joinable(true, None, now));
    }

    #[test]
    fn expired_codes_are_not_joinable() {
        let now = OffsetDateTime::now_utc();
        let past = now - Duration::days(1);
        assert!(!is_joinable(false, Some(past), now));
    }

    #[test]
    fn unused_unexpired_codes_are_joinable() {
        let now = OffsetDateTime::now_utc();
        let future = now + Duration::days(30);
        assert!(is_joinable(false, Some(future), now));
        assert!(is_joinable(false, None, now));
    }
}
