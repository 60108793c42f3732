use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Id, ParseLabelError};

/// What a cart item or order line points at in the catalog.
///
/// A line is either a physical product or a food product, never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ProductRef {
    Physical(Id),
    Food(Id),
}

impl ProductRef {
    pub fn id(&self) -> Id {
        match self {
            ProductRef::Physical(id) | ProductRef::Food(id) => *id,
        }
    }

    /// Label stored in the `product_kind` column.
    pub fn kind(&self) -> &'static str {
        match self {
            ProductRef::Physical(_) => "product",
            ProductRef::Food(_) => "food_product",
        }
    }

    pub fn from_parts(kind: &str, id: Id) -> Result<Self, ParseLabelError> {
        match kind {
            "product" => Ok(ProductRef::Physical(id)),
            "food_product" => Ok(ProductRef::Food(id)),
            other => Err(ParseLabelError::new("product kind", other)),
        }
    }
}

impl fmt::Display for ProductRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind(), self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_ref_parts() {
        let food = ProductRef::Food(7);
        assert_eq!(food.kind(), "food_product");
        assert_eq!(ProductRef::from_parts(food.kind(), food.id()).unwrap(), food);
        assert!(ProductRef::from_parts("service", 1).is_err());
    }

    #[test]
    fn test_product_ref_display() {
        assert_eq!(ProductRef::Physical(3).to_string(), "product#3");
    }
}
