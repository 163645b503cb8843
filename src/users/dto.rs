use serde::Deserialize;

/// Partial profile update. Credentials and role are deliberately absent;
/// they are not updatable through this path.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub full_name: Option<String>,
    pub phone_number: Option<String>,
}
