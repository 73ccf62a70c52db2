//! Signed-in user profile

use serde::{Deserialize, Serialize};

use super::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Role {
    #[default]
    User,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: EntityId,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
    pub public_slug: String,
}
