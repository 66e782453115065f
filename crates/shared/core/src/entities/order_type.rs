use serde::{Deserialize, Serialize};

/// Order types the scheduler can place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute at current market price
    Market,
    /// Execute at specified price or better
    Limit,
    /// Market order triggered when price reaches the aux (stop) price
    Stop,
    /// Stop that trails the market by a percent or an amount
    Trailing,
}

impl OrderType {
    /// Venue wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MKT",
            OrderType::Limit => "LMT",
            OrderType::Stop => "STP",
            OrderType::Trailing => "TRAIL",
        }
    }

    /// Stop and trailing orders protect a position rather than open one
    pub fn is_protective(&self) -> bool {
        matches!(self, OrderType::Stop | OrderType::Trailing)
    }
}
