//! Records owned by external systems (product catalog, operator directory).
//!
//! The engine only reads these.

use serde::{Deserialize, Serialize};

use stocktake_core::{OperatorId, ProductId};

/// Display name used when an operator can no longer be resolved.
pub const UNKNOWN_OPERATOR: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub code: String,
    pub name: String,
    pub category_code: String,
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub username: String,
    pub is_active: bool,
}
