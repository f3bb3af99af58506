use serde::{Deserialize, Serialize};

/// Direction of an order relative to the inventory.
///
/// A purchase is stock intake from a supplier and adds to the on-hand count;
/// a sale is stock outtake to a client and subtracts from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Purchase,
    Sale,
}

impl OrderKind {
    /// The inventory delta a line of `quantity` units applies for this kind.
    pub fn signed_delta(&self, quantity: u32) -> i64 {
        let quantity = i64::from(quantity);
        match self {
            OrderKind::Purchase => quantity,
            OrderKind::Sale => -quantity,
        }
    }

    /// Stable lowercase name, used as the persisted discriminator and as a
    /// metrics label.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Purchase => "purchase",
            OrderKind::Sale => "sale",
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown order kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown order kind: {0}")]
pub struct UnknownOrderKind(pub String);

impl std::str::FromStr for OrderKind {
    type Err = UnknownOrderKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(OrderKind::Purchase),
            "sale" => Ok(OrderKind::Sale),
            other => Err(UnknownOrderKind(other.to_string())),
        }
    }
}
