//! Accounting data module for A-shares.
//!
//! Provides the lookup contracts the valuation engine depends on and the
//! SQLite-backed snapshot store implementing them.
//!
//! # Facts
//! - **Indicators**: book value per share (每股净资产) and EPS (每股收益) per fiscal period
//! - **EPS forecasts**: analyst consensus for the next three years (盈利预测)
//! - **Industry ROE**: Shenwan level-2 industry benchmark (行业净资产收益率)

mod provider;
pub mod local_storage;

pub use local_storage::{LocalStorage, LocalStorageStats};
pub use provider::{ForecastSource, IndicatorSource, IndustrySource, ProviderError};

use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// Reported fundamentals of one company for one fiscal period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    /// Book value per share (每股净资产)
    pub book_value_per_share: Option<f64>,
    /// Earnings per share (每股收益)
    pub earnings_per_share: Option<f64>,
}

/// Analyst EPS forecasts for the three years following the base period.
///
/// Any field may be absent; absent and NaN are both `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EpsForecast {
    pub eps_y1: Option<f64>,
    pub eps_y2: Option<f64>,
    pub eps_y3: Option<f64>,
}

impl EpsForecast {
    /// Build from raw values, treating NaN as missing.
    pub fn from_raw(eps_y1: f64, eps_y2: f64, eps_y3: f64) -> Self {
        Self {
            eps_y1: finite(eps_y1),
            eps_y2: finite(eps_y2),
            eps_y3: finite(eps_y3),
        }
    }

    /// Forecasts ordered near, mid, far.
    pub fn years(&self) -> [Option<f64>; 3] {
        [self.eps_y1, self.eps_y2, self.eps_y3]
    }
}

/// Industry classification with its benchmark ROE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndustryRoe {
    pub industry_code: String,
    pub industry_name: String,
    pub roe: f64,
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forecast_from_raw_drops_nan() {
        let forecast = EpsForecast::from_raw(1.1, f64::NAN, 1.4);
        assert_eq!(forecast.years(), [Some(1.1), None, Some(1.4)]);
    }
}
