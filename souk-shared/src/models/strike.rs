use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Id, ParseLabelError};

/// Who a strike is recorded against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Offender {
    Client(Id),
    Vendor(Id),
    DeliveryAgent(Id),
}

impl Offender {
    pub fn kind(&self) -> &'static str {
        match self {
            Offender::Client(_) => "client",
            Offender::Vendor(_) => "vendor",
            Offender::DeliveryAgent(_) => "delivery_agent",
        }
    }

    pub fn id(&self) -> Id {
        match self {
            Offender::Client(id) | Offender::Vendor(id) | Offender::DeliveryAgent(id) => *id,
        }
    }

    pub fn from_parts(kind: &str, id: Id) -> Result<Self, ParseLabelError> {
        match kind {
            "client" => Ok(Offender::Client(id)),
            "vendor" => Ok(Offender::Vendor(id)),
            "delivery_agent" => Ok(Offender::DeliveryAgent(id)),
            other => Err(ParseLabelError::new("offender kind", other)),
        }
    }
}

/// Append-only penalty record. Only `is_active` may change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Strike {
    pub id: Id,
    pub offender: Offender,
    pub reason: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStrike {
    pub offender: Offender,
    pub reason: String,
}

impl NewStrike {
    pub fn new(offender: Offender, reason: impl Into<String>) -> Self {
        Self { offender, reason: reason.into() }
    }
}
