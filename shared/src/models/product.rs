//! Product Model

use serde::{Deserialize, Serialize};

/// Catalog product entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    /// Current catalog price; orders snapshot it per line at submission
    /// time, so later changes never touch existing orders
    pub price: f64,
    pub category: String,
    pub taxable: bool,
}
