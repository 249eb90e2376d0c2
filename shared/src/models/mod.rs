//! Catalog and account models
//!
//! Rows of the relational catalog (tables, products, users). These are
//! read-mostly pass-through types: the order core references them only
//! through snapshots taken at submission time.

pub mod dining_table;
pub mod product;
pub mod user;

pub use dining_table::DiningTable;
pub use product::Product;
pub use user::{AppUser, LoginRequest, LoginResponse};
