pub mod identity;
pub mod notify;
pub mod repository;
pub mod rules;

use souk_catalog::InventoryError;
use souk_shared::ParseLabelError;

/// Every rejection a core operation can surface to its caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Client-correctable rule violation.
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Lost a race or repeated a one-way transition.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// Stored data breaks a structural invariant; the operation is aborted.
    #[error("Data integrity violation: {0}")]
    IntegrityError(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: &str, id: i64) -> Self {
        Self::NotFound(format!("{} {} does not exist", what, id))
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::IntegrityError(msg.into())
    }
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InvalidQuantity(_) | InventoryError::InsufficientInventory { .. } => {
                CoreError::ValidationError(err.to_string())
            }
            InventoryError::Overflow(_) => CoreError::IntegrityError(err.to_string()),
        }
    }
}

impl From<ParseLabelError> for CoreError {
    fn from(err: ParseLabelError) -> Self {
        CoreError::IntegrityError(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
