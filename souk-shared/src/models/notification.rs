use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Id, ParseLabelError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Order,
    Message,
    CartOrderItem,
    ClaimedOrder,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Order => "order",
            NotificationCategory::Message => "message",
            NotificationCategory::CartOrderItem => "cart_order_item",
            NotificationCategory::ClaimedOrder => "claimed_order",
        }
    }
}

impl FromStr for NotificationCategory {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(NotificationCategory::Order),
            "message" => Ok(NotificationCategory::Message),
            "cart_order_item" => Ok(NotificationCategory::CartOrderItem),
            "claimed_order" => Ok(NotificationCategory::ClaimedOrder),
            other => Err(ParseLabelError::new("notification category", other)),
        }
    }
}

/// Closed set of entity kinds a notification may point at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    GlobalOrder,
    CartOrder,
    CartOrderItem,
    ClaimedOrder,
    CancellationRequest,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::GlobalOrder => "global_order",
            SubjectKind::CartOrder => "cart_order",
            SubjectKind::CartOrderItem => "cart_order_item",
            SubjectKind::ClaimedOrder => "claimed_order",
            SubjectKind::CancellationRequest => "cancellation_request",
        }
    }
}

impl FromStr for SubjectKind {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "global_order" => Ok(SubjectKind::GlobalOrder),
            "cart_order" => Ok(SubjectKind::CartOrder),
            "cart_order_item" => Ok(SubjectKind::CartOrderItem),
            "claimed_order" => Ok(SubjectKind::ClaimedOrder),
            "cancellation_request" => Ok(SubjectKind::CancellationRequest),
            other => Err(ParseLabelError::new("subject kind", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: Id,
}

impl Subject {
    pub fn cart_order(id: Id) -> Self {
        Self { kind: SubjectKind::CartOrder, id }
    }

    pub fn order_line(id: Id) -> Self {
        Self { kind: SubjectKind::CartOrderItem, id }
    }

    pub fn claim(id: Id) -> Self {
        Self { kind: SubjectKind::ClaimedOrder, id }
    }
}

/// Event record addressed to one user. Only `is_read` is mutable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Id,
    pub user_id: Id,
    pub message: String,
    pub subject: Option<Subject>,
    pub category: NotificationCategory,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: Id,
    pub message: String,
    pub subject: Option<Subject>,
    pub category: NotificationCategory,
}

impl NewNotification {
    pub fn new(
        user_id: Id,
        message: impl Into<String>,
        subject: Subject,
        category: NotificationCategory,
    ) -> Self {
        Self {
            user_id,
            message: message.into(),
            subject: Some(subject),
            category,
        }
    }
}
