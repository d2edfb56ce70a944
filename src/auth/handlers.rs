use actix_web::{HttpResponse, Responder, web};
use serde::Serialize;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};
use utoipa::ToSchema;

use crate::auth::password::verify_password;
use crate::model::role::RoleTag;
use crate::model::user::User;
use crate::models::{CredentialRow, LoginReqDto};
use crate::store::Stores;
use crate::store::mysql::user_by_email_sql;

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    #[schema(example = 42)]
    pub user_id: u64,
    #[schema(example = "alice@school.edu")]
    pub email: String,
    /// Highest-precedence role first.
    pub roles: Vec<RoleTag>,
}

/// Validate credentials and return the user's roles
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Credentials valid", body = LoginResponse),
        (status = 400, description = "Email or password missing"),
        (status = 401, description = "Invalid credentials"),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, stores, user),
    fields(email = %user.email)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    stores: web::Data<Stores>,
) -> impl Responder {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty email or password");
        return HttpResponse::BadRequest().body("Email or password required");
    }

    debug!("Fetching credentials from database");

    let sql = user_by_email_sql("id, email, password_hash");
    let credentials = match sqlx::query_as::<_, CredentialRow>(&sql)
        .bind(user.email.trim())
        .fetch_optional(pool.get_ref())
        .await
    {
        Ok(Some(row)) => {
            debug!(user_id = row.id, "User found");
            row
        }
        Ok(None) => {
            info!("Invalid credentials: user not found");
            return HttpResponse::Unauthorized().body("Invalid credentials");
        }
        Err(e) => {
            error!(error = %e, "Database error while fetching user");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let Some(hash) = credentials.password_hash.as_deref() else {
        info!(user_id = credentials.id, "Invalid credentials: no password set");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    };

    if let Err(e) = verify_password(&user.password, hash) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return HttpResponse::Unauthorized().body("Invalid credentials");
    }

    let roles = match stores.identities.roles_of(credentials.id).await {
        Ok(roles) => roles,
        Err(e) => {
            error!(error = %e, "Failed to load roles");
            return HttpResponse::InternalServerError().finish();
        }
    };

    let user = User {
        id: credentials.id,
        email: credentials.email,
        roles,
    };

    info!(user_id = user.id, primary_role = ?user.primary_role(), "Login successful");

    HttpResponse::Ok().json(LoginResponse {
        user_id: user.id,
        roles: user.ranked_roles(),
        email: user.email,
    })
}
