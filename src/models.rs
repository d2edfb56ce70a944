use serde::Deserialize;
use sqlx::FromRow;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema)]
pub struct LoginReqDto {
    #[schema(example = "alice@school.edu", format = "email")]
    pub email: String,
    #[schema(example = "s3cret", format = "password")]
    pub password: String,
}

#[derive(FromRow)]
pub struct CredentialRow {
    pub id: u64, // BIGINT UNSIGNED
    pub email: String,
    /// Card-only accounts have no password.
    pub password_hash: Option<String>,
}
