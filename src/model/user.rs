use std::collections::BTreeSet;

use serde::{Deserialize, Serialize, Serializer};
use utoipa::ToSchema;

use super::role::RoleTag;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: u64,
    pub email: String,
    /// Serialized highest-precedence first, the order taps are routed in.
    #[schema(value_type = Vec<RoleTag>)]
    #[serde(serialize_with = "serialize_ranked")]
    pub roles: BTreeSet<RoleTag>,
}

fn serialize_ranked<S: Serializer>(roles: &BTreeSet<RoleTag>, serializer: S) -> Result<S::Ok, S::Error> {
    let mut ranked: Vec<_> = roles.iter().copied().collect();
    ranked.sort_by_key(|r| r.rank());
    serializer.collect_seq(ranked)
}

impl User {
    /// Highest-precedence role held, if any.
    pub fn primary_role(&self) -> Option<RoleTag> {
        RoleTag::PRECEDENCE
            .into_iter()
            .find(|r| self.roles.contains(r))
    }

    /// Roles in dispatch precedence order.
    pub fn ranked_roles(&self) -> Vec<RoleTag> {
        RoleTag::PRECEDENCE
            .into_iter()
            .filter(|r| self.roles.contains(r))
            .collect()
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct UserRow {
    pub id: u64,
    pub email: String,
}
