use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use crate::attendance::{TapDispatcher, TapResponse};
use crate::error::AttendanceError;

#[derive(Debug, Deserialize, ToSchema)]
pub struct TapRequest {
    #[schema(example = "04A3B2C1")]
    pub uid_card: String,
    #[schema(example = "alice@school.edu", format = "email")]
    pub email: String,
}

/// Card tap from a reader
#[utoipa::path(
    post,
    path = "/api/attendance/tap",
    request_body = TapRequest,
    responses(
        (status = 200, description = "Tap processed", body = TapResponse),
        (status = 400, description = "Missing card UID or email", body = Object, example = json!({
            "error": "uid_card and email are required"
        })),
        (status = 404, description = "Unknown card, unknown user, or no class scheduled", body = Object, example = json!({
            "error": "Not found: no class scheduled"
        })),
        (status = 429, description = "Too many requests"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Attendance"
)]
#[instrument(name = "tap_endpoint", skip(dispatcher, req), fields(uid_card = %req.uid_card))]
pub async fn tap(
    req: web::Json<TapRequest>,
    dispatcher: web::Data<TapDispatcher>,
) -> Result<HttpResponse, AttendanceError> {
    if req.uid_card.trim().is_empty() || req.email.trim().is_empty() {
        debug!("Validation failed: empty card UID or email");
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "uid_card and email are required"
        })));
    }

    let outcome = dispatcher
        .process_tap(&req.uid_card, &req.email)
        .await
        .inspect_err(|e| {
            if e.is_transient() {
                error!(error = %e, "Tap failed");
            }
        })?;

    Ok(HttpResponse::Ok().json(TapResponse::from(&outcome)))
}
