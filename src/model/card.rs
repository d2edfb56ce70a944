use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Card {
    #[schema(example = 1)]
    pub id: u64,

    #[schema(example = "04:A2:19:7B")]
    pub uid: String,

    #[schema(example = 12, nullable = true)]
    pub user_id: Option<u64>,
}
