use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize, ToSchema,
    Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum RoleTag {
    Admin,
    Teacher,
    Student,
}

impl RoleTag {
    /// Order in which a tap is routed when a user holds several roles.
    pub const PRECEDENCE: [RoleTag; 3] = [RoleTag::Teacher, RoleTag::Student, RoleTag::Admin];

    /// Position of this role in [`RoleTag::PRECEDENCE`], lower wins.
    pub fn rank(self) -> usize {
        match self {
            RoleTag::Teacher => 0,
            RoleTag::Student => 1,
            RoleTag::Admin => 2,
        }
    }
}
