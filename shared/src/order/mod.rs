//! Order domain types
//!
//! The order body that travels over the HTTP API and the message bus.
//! All monetary arithmetic is done with `Decimal` internally and rounded
//! to 2 decimal places half-up; values cross the wire as plain floats.
//!
//! `Order::total` and `OrderItem::subtotal` are pure functions computed
//! on read. The total is never stored or transported authoritatively:
//! deserialization recomputes it from the items.

use chrono::{DateTime, Utc};
use rust_decimal::RoundingStrategy;
use rust_decimal::prelude::*;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Rounding precision for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Convert an f64 price into a Decimal, treating non-finite input as zero
fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Round a Decimal amount to cents and convert back to f64
fn to_money(amount: Decimal) -> f64 {
    amount
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or(0.0)
}

/// One product line within an order
///
/// Name and price are snapshots taken when the line was first inserted;
/// later catalog price changes never alter existing orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct OrderItem {
    /// Product reference
    pub product_id: i64,
    /// Product name snapshot
    pub name: String,
    /// Unit price snapshot
    pub price: f64,
    /// Quantity (>= 1; one line per product within an order)
    pub quantity: i64,
}

impl OrderItem {
    /// Line subtotal: unit price x quantity, rounded to cents
    pub fn subtotal(&self) -> f64 {
        to_money(to_decimal(self.price) * Decimal::from(self.quantity))
    }
}

/// An order owned by a single table
///
/// At most one order with `closed = false` exists per table; items are a
/// multiset keyed by product id (the server merges duplicate submissions
/// by adding quantities).
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub table_id: i64,
    pub party_size: i64,
    pub sent_to_kitchen: bool,
    pub closed: bool,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Order total: sum of line subtotals, rounded to cents
    pub fn total(&self) -> f64 {
        let sum: Decimal = self
            .items
            .iter()
            .map(|item| to_decimal(item.price) * Decimal::from(item.quantity))
            .sum();
        to_money(sum)
    }

    /// Look up a line by product id
    pub fn item(&self, product_id: i64) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }
}

// total 是派生值：序列化时现算，反序列化时丢弃输入里的值重新计算
impl Serialize for Order {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Order", 8)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("table_id", &self.table_id)?;
        state.serialize_field("party_size", &self.party_size)?;
        state.serialize_field("sent_to_kitchen", &self.sent_to_kitchen)?;
        state.serialize_field("closed", &self.closed)?;
        state.serialize_field("created_at", &self.created_at)?;
        state.serialize_field("items", &self.items)?;
        state.serialize_field("total", &self.total())?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Order {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            id: i64,
            table_id: i64,
            #[serde(default = "default_party_size")]
            party_size: i64,
            #[serde(default)]
            sent_to_kitchen: bool,
            #[serde(default)]
            closed: bool,
            created_at: DateTime<Utc>,
            #[serde(default)]
            items: Vec<OrderItem>,
            #[serde(default, rename = "total")]
            _total: f64,
        }

        let raw = Raw::deserialize(deserializer)?;
        Ok(Order {
            id: raw.id,
            table_id: raw.table_id,
            party_size: raw.party_size,
            sent_to_kitchen: raw.sent_to_kitchen,
            closed: raw.closed,
            created_at: raw.created_at,
            items: raw.items,
        })
    }
}

fn default_party_size() -> i64 {
    1
}

/// Submit/merge request body: the items a client wants added to the
/// table's open order (creating one if none exists)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub table_id: i64,
    #[serde(default = "default_party_size")]
    pub party_size: i64,
    pub items: Vec<OrderItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(product_id: i64, name: &str, price: f64, quantity: i64) -> OrderItem {
        OrderItem {
            product_id,
            name: name.into(),
            price,
            quantity,
        }
    }

    fn order(items: Vec<OrderItem>) -> Order {
        Order {
            id: 1,
            table_id: 7,
            party_size: 2,
            sent_to_kitchen: false,
            closed: false,
            created_at: Utc::now(),
            items,
        }
    }

    #[test]
    fn test_subtotal_is_exact() {
        // 1.2 * 3 must be 3.6, not a binary-float artifact
        assert_eq!(item(5, "Coffee", 1.2, 3).subtotal(), 3.6);
    }

    #[test]
    fn test_total_sums_lines() {
        let order = order(vec![
            item(5, "Coffee", 1.2, 3),
            item(9, "Tea", 1.0, 1),
        ]);
        assert_eq!(order.total(), 4.6);
    }

    #[test]
    fn test_total_rounds_half_up() {
        let order = order(vec![item(1, "Split bite", 0.125, 1)]);
        assert_eq!(order.total(), 0.13);
    }

    #[test]
    fn test_serialized_total_is_recomputed() {
        let order = order(vec![item(5, "Coffee", 1.2, 2)]);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["total"], serde_json::json!(2.4));

        // A tampered total on the wire is ignored on parse
        let mut tampered = json.clone();
        tampered["total"] = serde_json::json!(99.0);
        let parsed: Order = serde_json::from_value(tampered).unwrap();
        assert_eq!(parsed.total(), 2.4);
    }
}
