//! Scheduler configuration
//!
//! Loaded from JSON; every field falls back to its default when missing.
//!
//! ```json
//! {
//!   "ceilings": { "historical_data": 20, "market_data": 70 },
//!   "sweep_interval_ms": 1000,
//!   "sessions": [
//!     { "name": "Historical", "kinds": ["historical_data", "contract_details"] },
//!     { "name": "Market", "kinds": ["market_data", "place_order"] }
//!   ]
//! }
//! ```

use matrix_core::requests::BarSize;
use matrix_core::{ClientId, RequestKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Root scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Admission ceilings; kinds not listed are unlimited
    pub ceilings: HashMap<RequestKind, usize>,

    /// Period of the dispatch/timeout sweep
    pub sweep_interval_ms: u64,

    /// First client id handed out when a session is opened without one
    pub first_client_id: u32,

    pub timeouts: TimeoutConfig,

    pub historical: HistoricalTimeoutConfig,

    /// Session groups opened by `Scheduler::open_planned_sessions`
    pub sessions: Vec<SessionPlan>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ceilings: default_ceilings(),
            sweep_interval_ms: 1000,
            first_client_id: 123001,
            timeouts: TimeoutConfig::default(),
            historical: HistoricalTimeoutConfig::default(),
            sessions: Vec::new(),
        }
    }
}

fn default_ceilings() -> HashMap<RequestKind, usize> {
    HashMap::from([(RequestKind::HistoricalData, 20), (RequestKind::MarketData, 70)])
}

impl SchedulerConfig {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::from_json_str(&content)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some((kind, _)) = self.ceilings.iter().find(|(_, ceiling)| **ceiling == 0) {
            return Err(ConfigError::ZeroCeiling(*kind));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ConfigError::ZeroSweepInterval);
        }
        if let Some(plan) = self.sessions.iter().find(|plan| plan.kinds.is_empty()) {
            return Err(ConfigError::EmptySessionPlan(
                plan.client_id.unwrap_or(ClientId(0)),
            ));
        }
        Ok(())
    }

    pub fn with_ceiling(mut self, kind: RequestKind, ceiling: usize) -> Self {
        self.ceilings.insert(kind, ceiling);
        self
    }

    /// Remove the ceiling for `kind`, making it unlimited
    pub fn without_ceiling(mut self, kind: RequestKind) -> Self {
        self.ceilings.remove(&kind);
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_ms = interval.as_millis().max(1) as u64;
        self
    }

    pub fn with_session(mut self, plan: SessionPlan) -> Self {
        self.sessions.push(plan);
        self
    }

    pub fn ceiling(&self, kind: RequestKind) -> Option<usize> {
        self.ceilings.get(&kind).copied()
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Fixed per-kind timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Contract details and option chain lookups
    pub standard_secs: u64,
    pub market_data_secs: u64,
    /// Positions, positions-multi, open orders, account summary
    pub positions_secs: u64,
    pub managed_accounts_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            standard_secs: 20,
            market_data_secs: 300,
            positions_secs: 60,
            managed_accounts_secs: 30,
        }
    }
}

impl TimeoutConfig {
    /// Fixed timeout for `kind`. Historical requests are sized by the
    /// timeout policy and orders never time out.
    pub fn for_kind(&self, kind: RequestKind) -> Option<Duration> {
        let secs = match kind {
            RequestKind::ContractDetails | RequestKind::OptionChainParams => self.standard_secs,
            RequestKind::MarketData => self.market_data_secs,
            RequestKind::Positions
            | RequestKind::PositionsMulti
            | RequestKind::OpenOrders
            | RequestKind::AccountSummary => self.positions_secs,
            RequestKind::ManagedAccounts => self.managed_accounts_secs,
            RequestKind::HistoricalData | RequestKind::PlaceOrder => return None,
        };
        Some(Duration::from_secs(secs))
    }
}

/// Constants of the historical timeout heuristic
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoricalTimeoutConfig {
    pub minute_factor: u64,
    pub minute_base_secs: u64,
    pub month_factor: u64,
    pub month_base_secs: u64,
    pub default_factor: u64,
    pub default_base_secs: u64,
    /// Divisor applied to `count * factor * load`
    pub span_divisor: u64,
}

impl Default for HistoricalTimeoutConfig {
    fn default() -> Self {
        Self {
            minute_factor: 1440,
            minute_base_secs: 1440,
            month_factor: 30,
            month_base_secs: 30,
            default_factor: 10,
            default_base_secs: 30,
            span_divisor: 10000,
        }
    }
}

impl HistoricalTimeoutConfig {
    /// `(factor, base_secs)` for a bar size
    pub fn factor_and_base(&self, bar_size: BarSize) -> (u64, u64) {
        match bar_size {
            BarSize::Min1 => (self.minute_factor, self.minute_base_secs),
            BarSize::Month1 => (self.month_factor, self.month_base_secs),
            _ => (self.default_factor, self.default_base_secs),
        }
    }
}

/// A group of request kinds served by one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPlan {
    /// Label used in logs
    #[serde(default)]
    pub name: String,
    /// Explicit client id; allocated sequentially when absent
    #[serde(default)]
    pub client_id: Option<ClientId>,
    pub kinds: Vec<RequestKind>,
}

impl SessionPlan {
    pub fn new(name: impl Into<String>, kinds: impl Into<Vec<RequestKind>>) -> Self {
        Self {
            name: name.into(),
            client_id: None,
            kinds: kinds.into(),
        }
    }

    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }
}
