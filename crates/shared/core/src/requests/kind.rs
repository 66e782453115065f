use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of remote operation.
///
/// All requests of one kind share an admission ceiling (if configured) and
/// one send/cancel protocol pair on the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    HistoricalData,
    ContractDetails,
    OptionChainParams,
    MarketData,
    Positions,
    PositionsMulti,
    OpenOrders,
    PlaceOrder,
    AccountSummary,
    ManagedAccounts,
}

/// Per-session slots for whole-snapshot requests.
///
/// The venue does not tag snapshot callbacks with a request id, so at most
/// one request per slot may be active on a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingletonSlot {
    Positions,
    OpenOrders,
    ManagedAccounts,
}

impl RequestKind {
    pub const ALL: [RequestKind; 10] = [
        RequestKind::HistoricalData,
        RequestKind::ContractDetails,
        RequestKind::OptionChainParams,
        RequestKind::MarketData,
        RequestKind::Positions,
        RequestKind::PositionsMulti,
        RequestKind::OpenOrders,
        RequestKind::PlaceOrder,
        RequestKind::AccountSummary,
        RequestKind::ManagedAccounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::HistoricalData => "historical_data",
            RequestKind::ContractDetails => "contract_details",
            RequestKind::OptionChainParams => "option_chain_params",
            RequestKind::MarketData => "market_data",
            RequestKind::Positions => "positions",
            RequestKind::PositionsMulti => "positions_multi",
            RequestKind::OpenOrders => "open_orders",
            RequestKind::PlaceOrder => "place_order",
            RequestKind::AccountSummary => "account_summary",
            RequestKind::ManagedAccounts => "managed_accounts",
        }
    }

    pub fn singleton_slot(&self) -> Option<SingletonSlot> {
        match self {
            RequestKind::Positions => Some(SingletonSlot::Positions),
            RequestKind::OpenOrders => Some(SingletonSlot::OpenOrders),
            RequestKind::ManagedAccounts => Some(SingletonSlot::ManagedAccounts),
            _ => None,
        }
    }

    /// Whether the venue exposes a cancel call for this kind
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            RequestKind::HistoricalData
                | RequestKind::MarketData
                | RequestKind::Positions
                | RequestKind::PositionsMulti
                | RequestKind::PlaceOrder
                | RequestKind::AccountSummary
        )
    }

    /// Kinds answered by a single callback with no end marker
    pub fn completes_on_reply(&self) -> bool {
        matches!(
            self,
            RequestKind::ContractDetails | RequestKind::ManagedAccounts
        )
    }
}

impl SingletonSlot {
    pub fn kind(&self) -> RequestKind {
        match self {
            SingletonSlot::Positions => RequestKind::Positions,
            SingletonSlot::OpenOrders => RequestKind::OpenOrders,
            SingletonSlot::ManagedAccounts => RequestKind::ManagedAccounts,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton_slots_round_trip() {
        for kind in RequestKind::ALL {
            if let Some(slot) = kind.singleton_slot() {
                assert_eq!(slot.kind(), kind);
            }
        }
        assert_eq!(RequestKind::PlaceOrder.singleton_slot(), None);
    }

    #[test]
    fn test_reply_kinds_are_not_cancellable() {
        for kind in RequestKind::ALL {
            if kind.completes_on_reply() {
                assert!(!kind.is_cancellable(), "{kind}");
            }
        }
    }
}
