use actix_web::{HttpResponse, web};
use serde::Deserialize;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use crate::error::AttendanceError;
use crate::model::user::User;
use crate::store::Stores;

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    #[schema(example = "alice@school.edu", format = "email")]
    pub email: String,
}

/// Look up a user and their roles by email
#[utoipa::path(
    get,
    path = "/api/users",
    params(UserQuery),
    responses(
        (status = 200, description = "User found", body = User),
        (status = 404, description = "No user with this email"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Users"
)]
#[instrument(name = "find_user", skip(stores))]
pub async fn find_user(
    query: web::Query<UserQuery>,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, AttendanceError> {
    let user = stores
        .identities
        .find_user(query.email.trim())
        .await?
        .ok_or_else(|| AttendanceError::not_found("user"))?;

    Ok(HttpResponse::Ok().json(user))
}
