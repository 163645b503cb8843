use serde::Serialize;
use time::OffsetDateTime;

#[derive(Debug, Serialize)]
pub struct IssuedCodeResponse {
    pub code: String,
    pub expires_at: Option<OffsetDateTime>,
}
