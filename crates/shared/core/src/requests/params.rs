//! Outbound request parameters, one variant per request kind.
//!
//! The scheduler treats these as opaque apart from the few fields it needs
//! for timeouts (historical span and bar size) and indexing (contract).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::RequestKind;
use crate::entities::{Contract, InstrumentKey, Order, SecType};

/// Failure to parse a venue textual form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid duration: {0}")]
    Duration(String),

    #[error("Invalid bar size: {0}")]
    BarSize(String),
}

/// Unit of a historical span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationUnit {
    Seconds,
    Days,
    Weeks,
    Months,
    Years,
}

impl DurationUnit {
    fn code(&self) -> &'static str {
        match self {
            DurationUnit::Seconds => "S",
            DurationUnit::Days => "D",
            DurationUnit::Weeks => "W",
            DurationUnit::Months => "M",
            DurationUnit::Years => "Y",
        }
    }
}

/// Requested historical span, e.g. `30 D`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistoricalDuration {
    pub count: u32,
    pub unit: DurationUnit,
}

impl HistoricalDuration {
    pub fn new(count: u32, unit: DurationUnit) -> Self {
        Self { count, unit }
    }

    pub fn days(count: u32) -> Self {
        Self::new(count, DurationUnit::Days)
    }
}

impl fmt::Display for HistoricalDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.count, self.unit.code())
    }
}

impl FromStr for HistoricalDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let (Some(count), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ParseError::Duration(s.to_string()));
        };
        let count = count
            .parse::<u32>()
            .map_err(|_| ParseError::Duration(s.to_string()))?;
        let unit = match unit {
            "S" => DurationUnit::Seconds,
            "D" => DurationUnit::Days,
            "W" => DurationUnit::Weeks,
            "M" => DurationUnit::Months,
            "Y" => DurationUnit::Years,
            _ => return Err(ParseError::Duration(s.to_string())),
        };
        Ok(Self { count, unit })
    }
}

/// Bar granularity of a historical request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BarSize {
    Secs1,
    Secs5,
    Secs15,
    Secs30,
    Min1,
    Mins5,
    Mins15,
    Mins30,
    Hour1,
    Day1,
    Week1,
    Month1,
}

impl BarSize {
    const FORMS: [(BarSize, &'static str); 12] = [
        (BarSize::Secs1, "1 secs"),
        (BarSize::Secs5, "5 secs"),
        (BarSize::Secs15, "15 secs"),
        (BarSize::Secs30, "30 secs"),
        (BarSize::Min1, "1 min"),
        (BarSize::Mins5, "5 mins"),
        (BarSize::Mins15, "15 mins"),
        (BarSize::Mins30, "30 mins"),
        (BarSize::Hour1, "1 hour"),
        (BarSize::Day1, "1 day"),
        (BarSize::Week1, "1 week"),
        (BarSize::Month1, "1 month"),
    ];

    pub fn as_str(&self) -> &'static str {
        Self::FORMS
            .iter()
            .find(|(bar, _)| bar == self)
            .map(|(_, s)| *s)
            .unwrap_or("1 day")
    }
}

impl FromStr for BarSize {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::FORMS
            .iter()
            .find(|(_, form)| *form == s.trim())
            .map(|(bar, _)| *bar)
            .ok_or_else(|| ParseError::BarSize(s.to_string()))
    }
}

/// Data series requested from the historical endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhatToShow {
    Trades,
    Midpoint,
    Bid,
    Ask,
    BidAsk,
    HistoricalVolatility,
    OptionImpliedVolatility,
}

impl WhatToShow {
    pub fn as_str(&self) -> &'static str {
        match self {
            WhatToShow::Trades => "TRADES",
            WhatToShow::Midpoint => "MIDPOINT",
            WhatToShow::Bid => "BID",
            WhatToShow::Ask => "ASK",
            WhatToShow::BidAsk => "BID_ASK",
            WhatToShow::HistoricalVolatility => "HISTORICAL_VOLATILITY",
            WhatToShow::OptionImpliedVolatility => "OPTION_IMPLIED_VOLATILITY",
        }
    }
}

/// Historical bars request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalParams {
    pub contract: Contract,
    pub duration: HistoricalDuration,
    pub bar_size: BarSize,
    pub what_to_show: WhatToShow,
    /// Empty means "now"
    pub end_date_time: String,
    pub use_rth: bool,
    pub format_date: u8,
    pub keep_up_to_date: bool,
}

impl HistoricalParams {
    pub fn new(contract: Contract, duration: HistoricalDuration, bar_size: BarSize) -> Self {
        Self {
            contract,
            duration,
            bar_size,
            what_to_show: WhatToShow::Trades,
            end_date_time: String::new(),
            use_rth: false,
            format_date: 2,
            keep_up_to_date: false,
        }
    }

    pub fn with_what_to_show(mut self, what_to_show: WhatToShow) -> Self {
        self.what_to_show = what_to_show;
        self
    }

    pub fn with_end_date_time(mut self, end: impl Into<String>) -> Self {
        self.end_date_time = end.into();
        self
    }

    pub fn regular_hours_only(mut self) -> Self {
        self.use_rth = true;
        self
    }
}

/// Streaming quote request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataParams {
    pub contract: Contract,
    pub generic_ticks: String,
    pub snapshot: bool,
    pub regulatory_snapshot: bool,
}

impl MarketDataParams {
    pub fn streaming(contract: Contract) -> Self {
        Self {
            contract,
            generic_ticks: String::new(),
            snapshot: false,
            regulatory_snapshot: false,
        }
    }
}

/// Option chain (security definition) query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionChainQuery {
    pub underlying_symbol: String,
    /// Empty for stock options
    pub fut_fop_exchange: String,
    pub underlying_sec_type: SecType,
    pub underlying_con_id: i64,
}

impl OptionChainQuery {
    pub fn stock(underlying_symbol: impl Into<String>, underlying_con_id: i64) -> Self {
        Self {
            underlying_symbol: underlying_symbol.into(),
            fut_fop_exchange: String::new(),
            underlying_sec_type: SecType::Stock,
            underlying_con_id,
        }
    }
}

/// Parameters of one outbound request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RequestParams {
    HistoricalData(HistoricalParams),
    ContractDetails { contract: Contract },
    OptionChainParams(OptionChainQuery),
    MarketData(MarketDataParams),
    Positions,
    PositionsMulti { account: String, model_code: String },
    OpenOrders,
    PlaceOrder { contract: Contract, order: Order },
    AccountSummary { group: String, tags: Vec<String> },
    ManagedAccounts,
}

impl RequestParams {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestParams::HistoricalData(_) => RequestKind::HistoricalData,
            RequestParams::ContractDetails { .. } => RequestKind::ContractDetails,
            RequestParams::OptionChainParams(_) => RequestKind::OptionChainParams,
            RequestParams::MarketData(_) => RequestKind::MarketData,
            RequestParams::Positions => RequestKind::Positions,
            RequestParams::PositionsMulti { .. } => RequestKind::PositionsMulti,
            RequestParams::OpenOrders => RequestKind::OpenOrders,
            RequestParams::PlaceOrder { .. } => RequestKind::PlaceOrder,
            RequestParams::AccountSummary { .. } => RequestKind::AccountSummary,
            RequestParams::ManagedAccounts => RequestKind::ManagedAccounts,
        }
    }

    pub fn contract(&self) -> Option<&Contract> {
        match self {
            RequestParams::HistoricalData(p) => Some(&p.contract),
            RequestParams::ContractDetails { contract } => Some(contract),
            RequestParams::MarketData(p) => Some(&p.contract),
            RequestParams::PlaceOrder { contract, .. } => Some(contract),
            _ => None,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        match self {
            RequestParams::PlaceOrder { order, .. } => Some(order),
            _ => None,
        }
    }

    pub fn instrument_key(&self) -> Option<InstrumentKey> {
        self.contract().map(Contract::instrument_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Side;
    use rust_decimal_macros::dec;

    #[test]
    fn test_duration_parse_and_render() {
        let d: HistoricalDuration = "30 D".parse().unwrap();
        assert_eq!(d, HistoricalDuration::days(30));
        assert_eq!(d.to_string(), "30 D");
        assert!("30".parse::<HistoricalDuration>().is_err());
        assert!("x D".parse::<HistoricalDuration>().is_err());
        assert!("3 Q".parse::<HistoricalDuration>().is_err());
    }

    #[test]
    fn test_bar_size_forms() {
        assert_eq!("1 min".parse::<BarSize>().unwrap(), BarSize::Min1);
        assert_eq!("1 month".parse::<BarSize>().unwrap(), BarSize::Month1);
        assert_eq!(BarSize::Mins5.as_str(), "5 mins");
        assert_eq!(
            "2 fortnights".parse::<BarSize>(),
            Err(ParseError::BarSize("2 fortnights".to_string()))
        );
    }

    #[test]
    fn test_params_kind_and_key() {
        let params = RequestParams::PlaceOrder {
            contract: Contract::stock("MSFT"),
            order: Order::market(Side::Buy, dec!(1)),
        };
        assert_eq!(params.kind(), RequestKind::PlaceOrder);
        assert_eq!(params.instrument_key(), Some(InstrumentKey::from("MSFT")));
        assert!(params.order().is_some());
        assert_eq!(RequestParams::Positions.instrument_key(), None);
    }
}
