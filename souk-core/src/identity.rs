use serde::{Deserialize, Serialize};
use souk_shared::Id;

use crate::{CoreError, CoreResult};

/// Resolved role of the caller, carrying the matching profile id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "profile_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Client(Id),
    Vendor(Id),
    DeliveryAgent(Id),
    Superuser,
}

/// The acting principal passed explicitly into every state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Id,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: Id, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn client_id(&self) -> Option<Id> {
        match self.role {
            Role::Client(id) => Some(id),
            _ => None,
        }
    }

    pub fn vendor_id(&self) -> Option<Id> {
        match self.role {
            Role::Vendor(id) => Some(id),
            _ => None,
        }
    }

    pub fn delivery_agent_id(&self) -> Option<Id> {
        match self.role {
            Role::DeliveryAgent(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_superuser(&self) -> bool {
        self.role == Role::Superuser
    }

    pub fn require_client(&self, action: &str) -> CoreResult<Id> {
        self.client_id()
            .ok_or_else(|| CoreError::permission(format!("only clients can {}", action)))
    }

    pub fn require_vendor(&self, action: &str) -> CoreResult<Id> {
        self.vendor_id()
            .ok_or_else(|| CoreError::permission(format!("only vendors can {}", action)))
    }

    pub fn require_delivery_agent(&self, action: &str) -> CoreResult<Id> {
        self.delivery_agent_id()
            .ok_or_else(|| CoreError::permission(format!("only delivery agents can {}", action)))
    }

    pub fn require_superuser(&self, action: &str) -> CoreResult<()> {
        if self.is_superuser() {
            Ok(())
        } else {
            Err(CoreError::permission(format!("only superusers can {}", action)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_gates() {
        let vendor = Principal::new(10, Role::Vendor(4));
        assert_eq!(vendor.require_vendor("confirm orders").unwrap(), 4);

        let err = vendor.require_client("check out").unwrap_err();
        assert_eq!(err, CoreError::PermissionDenied("only clients can check out".to_string()));
        assert!(vendor.require_superuser("run the sweep").is_err());
    }
}
