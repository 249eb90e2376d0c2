//! Shared types for the Comanda order system
//!
//! Common types used by the server and native clients: message bus
//! envelope and payloads, order domain types, and catalog models.

pub mod message;
pub mod models;
pub mod order;

pub use serde::{Deserialize, Serialize};

// Message bus re-exports (for convenient access)
pub use message::{BusMessage, EventType};
