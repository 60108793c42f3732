use serde::{Deserialize, Serialize};

use crate::Id;

/// Buyer profile as resolved by the account service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientProfile {
    pub id: Id,
    pub user_id: Id,
    pub full_name: String,
    pub city: String,
    pub is_banned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorProfile {
    pub id: Id,
    pub user_id: Id,
    pub full_name: String,
    pub city: String,
    pub is_banned: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryAgentProfile {
    pub id: Id,
    pub user_id: Id,
    pub full_name: String,
    pub city: String,
    pub is_banned: bool,
}
