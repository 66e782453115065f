use serde::{Deserialize, Serialize};

/// How long a resting order stays working at the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    /// Good till cancelled; protective bracket legs are usually sent this way
    Gtc,
    Ioc,
    /// Only at the opening auction
    Opg,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Day => "DAY",
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Opg => "OPG",
        }
    }
}
