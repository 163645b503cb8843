//! Pure access-policy decisions. Every operation routes its role check
//! through here so authorization cannot drift between endpoints.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    MainUser,
    SharedUser,
}

/// The authenticated requester, as supplied by the JWT boundary.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn is_main(&self) -> bool {
        self.role == Role::MainUser
    }
}

/// Rates, bills, shared codes and cross-user consumption writes are
/// reserved for the account owner.
pub fn require_main_user(actor: &Actor) -> Result<(), ApiError> {
    if actor.is_main() {
        Ok(())
    } else {
        Err(ApiError::AccessDenied)
    }
}

/// Read access: any member of the household may read resources owned by any
/// other member. Violations are an explicit denial, never a silent filter.
pub fn ensure_can_read(
    actor: &Actor,
    owner_id: Uuid,
    group: &HashSet<Uuid>,
) -> Result<(), ApiError> {
    if owner_id == actor.id || group.contains(&owner_id) {
        Ok(())
    } else {
        Err(ApiError::AccessDenied)
    }
}

/// Consumption-record writes: main users may write for anyone in their
/// group, shared users only for themselves.
pub fn ensure_can_write_reading(
    actor: &Actor,
    owner_id: Uuid,
    group: &HashSet<Uuid>,
) -> Result<(), ApiError> {
    match actor.role {
        Role::MainUser if group.contains(&owner_id) || owner_id == actor.id => Ok(()),
        Role::SharedUser if owner_id == actor.id => Ok(()),
        _ => Err(ApiError::AccessDenied),
    }
}

/// Payments: a main user may pay any bill, a shared user only bills they own.
pub fn ensure_can_pay(actor: &Actor, bill_owner: Uuid) -> Result<(), ApiError> {
    if actor.is_main() || bill_owner == actor.id {
        Ok(())
    } else {
        Err(ApiError::AccessDenied)
    }
}

/// Profile updates: main users may edit anyone, shared users only themselves.
pub fn ensure_can_update_user(actor: &Actor, target: Uuid) -> Result<(), ApiError> {
    if actor.is_main() || target == actor.id {
        Ok(())
    } else {
        Err(ApiError::AccessDenied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn main_actor() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role: Role::MainUser,
        }
    }

    fn shared_actor() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            role: Role::SharedUser,
        }
    }

    #[test]
    fn only_main_users_pass_require_main() {
        assert!(require_main_user(&main_actor()).is_ok());
        assert!(matches!(
            require_main_user(&shared_actor()),
            Err(ApiError::AccessDenied)
        ));
    }

    #[test]
    fn shared_users_read_the_whole_household() {
        let actor = shared_actor();
        let other = Uuid::new_v4();
        let group: HashSet<Uuid> = [actor.id, other].into_iter().collect();
        assert!(ensure_can_read(&actor, other, &group).is_ok());
    }

    #[test]
    fn reads_outside_the_group_are_denied() {
        let actor = shared_actor();
        let group: HashSet<Uuid> = [actor.id].into_iter().collect();
        let stranger = Uuid::new_v4();
        assert!(matches!(
            ensure_can_read(&actor, stranger, &group),
            Err(ApiError::AccessDenied)
        ));
    }

    #[test]
    fn shared_users_write_only_their_own_readings() {
        let actor = shared_actor();
        let other = Uuid::new_v4();
        let group: HashSet<Uuid> = [actor.id, other].into_iter().collect();
        assert!(ensure_can_write_reading(&actor, actor.id, &group).is_ok());
        assert!(matches!(
            ensure_can_write_reading(&actor, other, &group),
            Err(ApiError::AccessDenied)
        ));
    }

    #[test]
    fn main_users_write_readings_for_group_members() {
        let actor = main_actor();
        let member = Uuid::new_v4();
        let group: HashSet<Uuid> = [actor.id, member].into_iter().collect();
        assert!(ensure_can_write_reading(&actor, member, &group).is_ok());
    }

    #[test]
    fn shared_users_pay_only_their_own_bills() {
        let actor = shared_actor();
        assert!(ensure_can_pay(&actor, actor.id).is_ok());
        assert!(matches!(
            ensure_can_pay(&actor, Uuid::new_v4()),
            Err(ApiError::AccessDenied)
        ));
        assert!(ensure_can_pay(&main_actor(), Uuid::new_v4()).is_ok());
    }

    #[test]
    fn role_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Role::MainUser).unwrap(),
            "\"main_user\""
        );
        assert_eq!(
            serde_json::to_string(&Role::SharedUser).unwrap(),
            "\"shared_user\""
        );
    }
}
