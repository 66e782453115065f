use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderType, Side, TimeInForce};
use crate::values::{Price, Quantity, RequestId};

/// How a stop is triggered on the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMethod {
    /// Venue default: double bid/ask for OTC stocks and US options, last otherwise
    Default,
    DoubleBidAsk,
    Last,
    DoubleLast,
    BidAsk,
    LastOrBidAsk,
    Midpoint,
}

impl TriggerMethod {
    pub fn code(&self) -> u8 {
        match self {
            TriggerMethod::Default => 0,
            TriggerMethod::DoubleBidAsk => 1,
            TriggerMethod::Last => 2,
            TriggerMethod::DoubleLast => 3,
            TriggerMethod::BidAsk => 4,
            TriggerMethod::LastOrBidAsk => 7,
            TriggerMethod::Midpoint => 8,
        }
    }
}

/// Distance a trailing stop keeps from the market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trail {
    Percent(Decimal),
    Amount(Price),
}

/// Order ticket handed to the venue with a place-order request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub action: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub account: Option<String>,
    /// Required for Limit orders
    pub limit_price: Option<Price>,
    /// Stop price for Stop orders, trailing amount for Trailing orders
    pub aux_price: Option<Price>,
    pub trailing_percent: Option<Decimal>,
    /// Initial stop level of a trailing order
    pub trail_stop_price: Option<Price>,
    /// Parent order for attached (bracket) orders
    pub parent_id: Option<RequestId>,
    pub trigger_method: TriggerMethod,
    pub time_in_force: Option<TimeInForce>,
    /// When false the venue holds the order until a later order in the
    /// same bracket is transmitted
    pub transmit: bool,
}

impl Order {
    fn base(action: Side, order_type: OrderType, quantity: Quantity) -> Self {
        Self {
            action,
            order_type,
            quantity,
            account: None,
            limit_price: None,
            aux_price: None,
            trailing_percent: None,
            trail_stop_price: None,
            parent_id: None,
            trigger_method: TriggerMethod::Default,
            time_in_force: None,
            transmit: true,
        }
    }

    /// Market order
    pub fn market(action: Side, quantity: Quantity) -> Self {
        Self::base(action, OrderType::Market, quantity)
    }

    /// Limit order
    pub fn limit(action: Side, quantity: Quantity, limit_price: Price) -> Self {
        let mut order = Self::base(action, OrderType::Limit, quantity);
        order.limit_price = Some(limit_price);
        order
    }

    /// Hard stop
    pub fn stop(action: Side, quantity: Quantity, stop_price: Price) -> Self {
        let mut order = Self::base(action, OrderType::Stop, quantity);
        order.aux_price = Some(stop_price);
        order
    }

    /// Trailing stop, triggered on the midpoint by default
    pub fn trailing(action: Side, quantity: Quantity, trail: Trail) -> Self {
        let mut order = Self::base(action, OrderType::Trailing, quantity);
        match trail {
            Trail::Percent(percent) => order.trailing_percent = Some(percent),
            Trail::Amount(amount) => order.aux_price = Some(amount),
        }
        order.trigger_method = TriggerMethod::Midpoint;
        order
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_parent(mut self, parent_id: RequestId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_trail_stop_price(mut self, price: Price) -> Self {
        self.trail_stop_price = Some(price);
        self
    }

    pub fn with_trigger_method(mut self, trigger_method: TriggerMethod) -> Self {
        self.trigger_method = trigger_method;
        self
    }

    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = Some(time_in_force);
        self
    }

    pub fn with_transmit(mut self, transmit: bool) -> Self {
        self.transmit = transmit;
        self
    }

    pub fn is_protective(&self) -> bool {
        self.order_type.is_protective()
    }

    /// Validate the order based on order type requirements
    pub fn validate(&self) -> bool {
        if self.quantity <= Decimal::ZERO {
            return false;
        }
        match self.order_type {
            OrderType::Market => true,
            OrderType::Limit => self.limit_price.is_some(),
            OrderType::Stop => self.aux_price.is_some(),
            OrderType::Trailing => self.aux_price.is_some() || self.trailing_percent.is_some(),
        }
    }
}
