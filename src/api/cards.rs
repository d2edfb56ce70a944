use actix_web::{HttpResponse, web};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::error::AttendanceError;
use crate::model::card::Card;
use crate::store::Stores;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterCard {
    #[schema(example = "04A3B2C1")]
    pub uid_card: String,
    /// Owner of the card, if already known.
    #[schema(example = 42)]
    pub user_id: Option<u64>,
}

/// Register a card UID
#[utoipa::path(
    post,
    path = "/api/cards",
    request_body = RegisterCard,
    responses(
        (status = 201, description = "Card registered", body = Card),
        (status = 400, description = "Missing card UID"),
        (status = 409, description = "Card UID already registered", body = Object, example = json!({
            "error": "Conflict: card already registered"
        })),
        (status = 500, description = "Internal server error")
    ),
    tag = "Cards"
)]
#[instrument(name = "register_card", skip(stores, req), fields(uid_card = %req.uid_card))]
pub async fn register_card(
    req: web::Json<RegisterCard>,
    stores: web::Data<Stores>,
) -> Result<HttpResponse, AttendanceError> {
    let uid = req.uid_card.trim();
    if uid.is_empty() {
        return Ok(HttpResponse::BadRequest().json(json!({
            "error": "uid_card is required"
        })));
    }

    let card = stores
        .cards
        .register_card(uid, req.user_id)
        .await
        .inspect_err(|e| {
            if e.is_conflict() {
                info!("Card UID already registered");
            }
        })?;
    info!(card_id = card.id, user_id = ?card.user_id, "Card registered");

    Ok(HttpResponse::Created().json(card))
}
