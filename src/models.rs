use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Wire and Storage Models
// ============================================================================

/// What a product lifecycle event asks the stock service to do.
///
/// The wire format is a plain string; anything other than `"delete"`
/// (including an absent field) means create. The string is decoded into this
/// enum once, at the queue boundary, so nothing downstream branches on raw
/// strings.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StockAction {
    #[default]
    Create,
    Delete,
}

impl<'de> Deserialize<'de> for StockAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "delete" => StockAction::Delete,
            _ => StockAction::Create,
        })
    }
}

impl StockAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockAction::Create => "create",
            StockAction::Delete => "delete",
        }
    }
}

/// Product lifecycle event carried on the durable queue.
///
/// No identity beyond the payload itself; duplicates are possible under
/// redelivery, so every handler must be idempotent.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StockEvent {
    pub product_id: i32,
    #[serde(default)]
    pub action: StockAction,
}

impl StockEvent {
    pub fn create(product_id: i32) -> Self {
        Self {
            product_id,
            action: StockAction::Create,
        }
    }

    pub fn delete(product_id: i32) -> Self {
        Self {
            product_id,
            action: StockAction::Delete,
        }
    }
}

/// One stock row per live product. `last_updated` is server-assigned.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct StockRecord {
    pub id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub last_updated: DateTime<Utc>,
}

/// Partial update applied through the stock update API.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StockUpdate {
    pub quantity: Option<i32>,
}
