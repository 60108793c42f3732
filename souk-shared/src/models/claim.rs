use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Id, ParseLabelError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Processing,
    ClaimedFromVendor,
    OnTheWay,
    Delivered,
    Returned,
    Canceled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::ClaimedFromVendor => "claimed_from_vendor",
            DeliveryStatus::OnTheWay => "on_the_way",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Returned => "returned",
            DeliveryStatus::Canceled => "canceled",
        }
    }

    /// Position along the happy path; absorbing alternates have none.
    pub fn progress(&self) -> Option<u8> {
        match self {
            DeliveryStatus::Processing => Some(0),
            DeliveryStatus::ClaimedFromVendor => Some(1),
            DeliveryStatus::OnTheWay => Some(2),
            DeliveryStatus::Delivered => Some(3),
            DeliveryStatus::Returned | DeliveryStatus::Canceled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Delivered | DeliveryStatus::Returned | DeliveryStatus::Canceled
        )
    }
}

impl FromStr for DeliveryStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DeliveryStatus::Processing),
            "claimed_from_vendor" => Ok(DeliveryStatus::ClaimedFromVendor),
            "on_the_way" => Ok(DeliveryStatus::OnTheWay),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "returned" => Ok(DeliveryStatus::Returned),
            "canceled" => Ok(DeliveryStatus::Canceled),
            other => Err(ParseLabelError::new("delivery status", other)),
        }
    }
}

/// A delivery agent's exclusive, time-boxed right to deliver one order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimedOrder {
    pub id: Id,
    pub delivery_agent_id: Id,
    pub order_id: Id,
    pub is_confirmed_by_vendor: bool,
    pub expiration_date_time: DateTime<Utc>,
    pub is_failed: bool,
    pub delivery_status: DeliveryStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ClaimedOrder {
    /// Counts against the one-claim-per-order rule until it fails.
    pub fn is_live(&self) -> bool {
        !self.is_failed
    }

    /// Due for the expiry sweep at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date_time <= now && !self.is_confirmed_by_vendor && !self.is_failed
    }
}

/// Pickup window applied when a claim is stored without a deadline.
pub const DEFAULT_CLAIM_WINDOW_SECONDS: i64 = 2 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewClaim {
    pub delivery_agent_id: Id,
    pub order_id: Id,
    pub expiration_date_time: Option<DateTime<Utc>>,
}

impl NewClaim {
    /// Deadline to persist for a claim created at `created_at`.
    pub fn expiration_or_default(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        self.expiration_date_time
            .unwrap_or_else(|| created_at + Duration::seconds(DEFAULT_CLAIM_WINDOW_SECONDS))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancellationReason {
    /// Vendor not reachable
    Vnr,
    /// Client not reachable
    Cnr,
    /// Delivery agent not reachable
    Anr,
    Others,
}

impl CancellationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancellationReason::Vnr => "VNR",
            CancellationReason::Cnr => "CNR",
            CancellationReason::Anr => "ANR",
            CancellationReason::Others => "OTHERS",
        }
    }
}

impl FromStr for CancellationReason {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VNR" => Ok(CancellationReason::Vnr),
            "CNR" => Ok(CancellationReason::Cnr),
            "ANR" => Ok(CancellationReason::Anr),
            "OTHERS" => Ok(CancellationReason::Others),
            other => Err(ParseLabelError::new("cancellation reason", other)),
        }
    }
}

/// Filed by a delivery agent who cannot complete a claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancellationRequest {
    pub id: Id,
    pub claimed_order_id: Id,
    pub reason: CancellationReason,
    pub is_approved: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
