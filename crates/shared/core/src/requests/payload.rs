//! Inbound data delivered by session callbacks

use serde::{Deserialize, Serialize};

use crate::entities::{Contract, Order};
use crate::values::{Price, Quantity, RequestId, Timestamp};

/// One historical bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: Timestamp,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
}

/// One streamed tick; `field` is the venue tick-type name (e.g. `BID`, `LAST_SIZE`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub time: Timestamp,
    pub field: String,
    pub value: Price,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDetails {
    pub contract: Contract,
    pub min_tick: Price,
    pub long_name: String,
}

/// Option chain description for one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub exchange: String,
    pub underlying_con_id: i64,
    pub trading_class: String,
    pub multiplier: u32,
    pub expirations: Vec<String>,
    pub strikes: Vec<Price>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub account: String,
    pub contract: Contract,
    pub position: Quantity,
    pub avg_cost: Price,
    /// Set on per-account (multi) position reports
    pub model_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrderEntry {
    pub order_id: RequestId,
    pub contract: Contract,
    pub order: Order,
    pub status: String,
}

/// Order status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    pub time: Timestamp,
    pub status: String,
    pub filled: Quantity,
    pub remaining: Quantity,
    pub avg_fill_price: Price,
    pub last_fill_price: Price,
    pub perm_id: i64,
    pub parent_id: i64,
    pub why_held: String,
}

impl OrderStatusUpdate {
    pub fn is_filled(&self) -> bool {
        self.status == "Filled"
    }
}

/// Execution (fill) report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub exec_id: String,
    pub order_id: RequestId,
    pub time: Timestamp,
    pub shares: Quantity,
    pub price: Price,
    pub side: String,
}

/// Commission report; correlated to an order only through `exec_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionReport {
    pub exec_id: String,
    pub commission: Price,
    pub currency: String,
    pub realized_pnl: Option<Price>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountValue {
    pub account: String,
    pub tag: String,
    pub value: String,
    pub currency: String,
}

/// A single inbound data event, already decoded by the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Bar(Bar),
    PriceTick(Tick),
    SizeTick(Tick),
    ContractDetails(ContractDetails),
    OptionChain(OptionChain),
    Position(PositionEntry),
    OpenOrder(OpenOrderEntry),
    OrderStatus(OrderStatusUpdate),
    Execution(Execution),
    Commission(CommissionReport),
    AccountValue(AccountValue),
    ManagedAccounts(Vec<String>),
}

impl Payload {
    pub fn name(&self) -> &'static str {
        match self {
            Payload::Bar(_) => "bar",
            Payload::PriceTick(_) => "price",
            Payload::SizeTick(_) => "size",
            Payload::ContractDetails(_) => "contract_details",
            Payload::OptionChain(_) => "option_chain",
            Payload::Position(_) => "position",
            Payload::OpenOrder(_) => "open_order",
            Payload::OrderStatus(_) => "order_status",
            Payload::Execution(_) => "execution_details",
            Payload::Commission(_) => "commission",
            Payload::AccountValue(_) => "account_value",
            Payload::ManagedAccounts(_) => "managed_accounts",
        }
    }
}
