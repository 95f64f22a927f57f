//! Payload records accepted by the publish endpoints.
//!
//! These are forwarded to the broker exactly as received; no field is
//! inspected when choosing where a message goes.

use serde::{Deserialize, Serialize};

/// A named color, e.g. `{"name":"red","code":"#FF0000"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub name: String,
    /// Hex color code
    pub code: String,
}

/// A named polygon, e.g. `{"name":"triangle","sides":3}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    pub name: String,
    pub sides: u32,
}
