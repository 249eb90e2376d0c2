//! Dining Table Model

use serde::{Deserialize, Serialize};

/// Dining table entity
///
/// Position fields belong to the floor-plan view; the order core never
/// interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct DiningTable {
    pub id: i64,
    /// Display number shown on the floor plan and tickets
    pub number: i64,
    pub occupied: bool,
    pub locked: bool,
    pub pos_x: f64,
    pub pos_y: f64,
}
