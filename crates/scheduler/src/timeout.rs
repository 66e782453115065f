//! Historical request timeouts
//!
//! A historical fetch can legitimately take anywhere from seconds to tens of
//! minutes depending on the span and granularity requested, so its deadline
//! is computed rather than fixed. The policy is a trait so the constants can
//! be retuned per venue.

use matrix_core::requests::HistoricalParams;
use std::time::Duration;

use crate::config::HistoricalTimeoutConfig;

/// Computes the deadline of a historical data request
pub trait TimeoutPolicy: Send + Sync {
    /// `load_factor` is the number of sibling requests issued together;
    /// `ceiling` is the historical admission ceiling, if any.
    fn historical_timeout(
        &self,
        params: &HistoricalParams,
        load_factor: usize,
        ceiling: Option<usize>,
    ) -> Duration;
}

/// Base constant by bar granularity plus a term growing with span and load:
///
/// ```text
/// load    = min(load_factor, ceiling), at least 1
/// timeout = base + max(count * factor * load / divisor, floor(sqrt(factor * load)))
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeuristicTimeout {
    config: HistoricalTimeoutConfig,
}

impl HeuristicTimeout {
    pub fn new(config: HistoricalTimeoutConfig) -> Self {
        Self { config }
    }
}

impl TimeoutPolicy for HeuristicTimeout {
    fn historical_timeout(
        &self,
        params: &HistoricalParams,
        load_factor: usize,
        ceiling: Option<usize>,
    ) -> Duration {
        let load = ceiling
            .map_or(load_factor, |ceiling| load_factor.min(ceiling))
            .max(1) as u64;
        let (factor, base) = self.config.factor_and_base(params.bar_size);
        let count = u64::from(params.duration.count);

        let span_term = count.saturating_mul(factor).saturating_mul(load)
            / self.config.span_divisor.max(1);
        let load_term = (factor.saturating_mul(load) as f64).sqrt() as u64;

        Duration::from_secs(base.saturating_add(span_term.max(load_term)))
    }
}
