use serde::{Deserialize, Serialize};
use std::fmt;

use crate::values::{Price, Symbol};

/// Security type of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecType {
    Stock,
    Option,
    Future,
    Index,
    Forex,
}

impl SecType {
    /// Venue wire form
    pub fn as_str(&self) -> &'static str {
        match self {
            SecType::Stock => "STK",
            SecType::Option => "OPT",
            SecType::Future => "FUT",
            SecType::Index => "IND",
            SecType::Forex => "CASH",
        }
    }
}

/// Option right: Call (right to buy) or Put (right to sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionRight::Call => write!(f, "C"),
            OptionRight::Put => write!(f, "P"),
        }
    }
}

/// Instrument description sent with market data, historical and order requests
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contract {
    pub symbol: Symbol,
    pub sec_type: SecType,
    pub currency: String,
    pub exchange: String,
    pub primary_exchange: Option<String>,
    /// Venue contract id, when already resolved
    pub con_id: Option<i64>,
    /// Options only
    pub strike: Option<Price>,
    /// Options/futures: `YYYYMMDD` or `YYYYMM`
    pub expiry: Option<String>,
    pub right: Option<OptionRight>,
    pub multiplier: Option<u32>,
}

impl Contract {
    /// US stock routed through the smart router
    pub fn stock(symbol: impl Into<Symbol>) -> Self {
        Self {
            symbol: symbol.into(),
            sec_type: SecType::Stock,
            currency: "USD".to_string(),
            exchange: "SMART".to_string(),
            primary_exchange: Some("ISLAND".to_string()),
            con_id: None,
            strike: None,
            expiry: None,
            right: None,
            multiplier: None,
        }
    }

    /// US equity option routed through the smart router
    pub fn option(
        symbol: impl Into<Symbol>,
        strike: Price,
        expiry: impl Into<String>,
        multiplier: u32,
        right: OptionRight,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            sec_type: SecType::Option,
            currency: "USD".to_string(),
            exchange: "SMART".to_string(),
            primary_exchange: None,
            con_id: None,
            strike: Some(strike),
            expiry: Some(expiry.into()),
            right: Some(right),
            multiplier: Some(multiplier),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_exchange(mut self, exchange: impl Into<String>) -> Self {
        self.exchange = exchange.into();
        self
    }

    pub fn with_con_id(mut self, con_id: i64) -> Self {
        self.con_id = Some(con_id);
        self
    }

    /// Key used to index requests by instrument.
    ///
    /// Options are keyed by `(symbol, strike)`, everything else by symbol.
    pub fn instrument_key(&self) -> InstrumentKey {
        match (self.sec_type, self.strike) {
            (SecType::Option, Some(strike)) => InstrumentKey::Option {
                symbol: self.symbol.clone(),
                strike,
            },
            _ => InstrumentKey::Symbol(self.symbol.clone()),
        }
    }
}

/// Instrument identity used for per-instrument request indexes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKey {
    Symbol(Symbol),
    Option { symbol: Symbol, strike: Price },
}

impl InstrumentKey {
    pub fn symbol(&self) -> &str {
        match self {
            InstrumentKey::Symbol(symbol) => symbol,
            InstrumentKey::Option { symbol, .. } => symbol,
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, InstrumentKey::Option { .. })
    }
}

impl fmt::Display for InstrumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentKey::Symbol(symbol) => write!(f, "{}", symbol),
            InstrumentKey::Option { symbol, strike } => write!(f, "{}@{}", symbol, strike),
        }
    }
}

impl From<&str> for InstrumentKey {
    fn from(symbol: &str) -> Self {
        InstrumentKey::Symbol(symbol.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stock_key_is_symbol() {
        let contract = Contract::stock("AAPL");
        assert_eq!(contract.sec_type.as_str(), "STK");
        assert_eq!(contract.instrument_key(), InstrumentKey::from("AAPL"));
    }

    #[test]
    fn test_option_key_includes_strike() {
        let contract = Contract::option("AAPL", dec!(150), "20250117", 100, OptionRight::Call);
        let key = contract.instrument_key();
        assert!(key.is_option());
        assert_eq!(key.symbol(), "AAPL");
        assert_eq!(key.to_string(), "AAPL@150");
        assert_ne!(key, InstrumentKey::from("AAPL"));
    }
}
