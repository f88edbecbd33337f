//! RIM Valuation Types.
//!
//! Company identifiers, the valuation proposal (the immutable input record of
//! the residual income model) and the sensitivity grid it produces.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::RimError;
use aqi_common::config::{RateRangeConfig, ValuationConfig, MAX_GRID_CELLS, MAX_RANGE_POINTS};

/// Number of explicit forecast years in the model.
pub const FORECAST_YEARS: usize = 3;

/// Exchange/board prefixes of mainland A-share codes.
///
/// 000 深市主板, 002 中小板, 300 创业板, 600/601/603/608 沪市主板, 688 科创板
pub const ALLOWED_PREFIXES: [&str; 8] = ["000", "002", "300", "600", "601", "603", "608", "688"];

// ============================================================================
// Company Identifier
// ============================================================================

/// A validated 6-digit A-share company code (e.g. "000625").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CompanyCode(String);

impl CompanyCode {
    /// Validate a raw code against the format and prefix whitelist.
    pub fn parse(raw: &str) -> Result<Self, RimError> {
        let invalid = |reason: &'static str| RimError::InvalidIdentifier {
            code: raw.to_string(),
            reason,
        };

        if raw.len() != 6 {
            return Err(invalid("expected 6 characters"));
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("expected digits only"));
        }
        if !ALLOWED_PREFIXES.contains(&&raw[..3]) {
            return Err(invalid("prefix is not an A-share board"));
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompanyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CompanyCode {
    type Err = RimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CompanyCode {
    type Error = RimError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CompanyCode> for String {
    fn from(code: CompanyCode) -> Self {
        code.0
    }
}

// ============================================================================
// Valuation Proposal
// ============================================================================

/// Input record of the residual income model for one company.
///
/// Built once per company by the proposal builder and shared read-only
/// afterwards. A refreshed proposal is a new record, never an in-place edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationProposal {
    pub code: CompanyCode,
    /// Base-year book value per share (基期每股净资产)
    pub bps_base: f64,
    /// Base-year earnings per share (基期每股收益)
    pub eps_base: f64,
    /// Industry benchmark ROE (行业净资产收益率)
    pub industry_roe: f64,
    /// Forecast EPS for the near, mid and far year; missing forecasts are 0.0
    pub eps_forecast: [f64; FORECAST_YEARS],
}

// ============================================================================
// Grid Configuration
// ============================================================================

/// Inclusive, evenly spaced range of rates.
///
/// A degenerate range (min == max) is a single value regardless of `count`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RateRange {
    min: f64,
    max: f64,
    count: usize,
}

impl RateRange {
    /// Range with `count` points from `min` to `max` inclusive.
    pub fn new(min: f64, max: f64, count: usize) -> Result<Self, RimError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(RimError::InvalidConfig(format!(
                "range bounds must be finite, got [{}, {}]",
                min, max
            )));
        }
        if min > max {
            return Err(RimError::InvalidConfig(format!(
                "inverted range: min {} exceeds max {}",
                min, max
            )));
        }
        if count == 0 {
            return Err(RimError::InvalidConfig("empty range: count is 0".into()));
        }
        if count > MAX_RANGE_POINTS {
            return Err(RimError::InvalidConfig(format!(
                "range count {} exceeds limit {}",
                count, MAX_RANGE_POINTS
            )));
        }
        if min < max && count < 2 {
            return Err(RimError::InvalidConfig(format!(
                "range [{}, {}] needs at least 2 points",
                min, max
            )));
        }

        let count = if min == max { 1 } else { count };
        Ok(Self { min, max, count })
    }

    /// Range from `min` to `max` in increments of `step`.
    ///
    /// The span must be a whole number of steps (within rounding noise).
    pub fn with_step(min: f64, max: f64, step: f64) -> Result<Self, RimError> {
        if min == max {
            return Self::new(min, max, 1);
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(RimError::InvalidConfig(format!(
                "step must be positive, got {}",
                step
            )));
        }

        let intervals = (max - min) / step;
        let rounded = intervals.round();
        if (intervals - rounded).abs() > 1e-6 {
            return Err(RimError::InvalidConfig(format!(
                "step {} does not divide [{}, {}] evenly",
                step, min, max
            )));
        }

        if rounded + 1.0 > MAX_RANGE_POINTS as f64 {
            return Err(RimError::InvalidConfig(format!(
                "step {} gives more than {} points over [{}, {}]",
                step, MAX_RANGE_POINTS, min, max
            )));
        }

        Self::new(min, max, rounded as usize + 1)
    }

    /// A single-value range.
    pub fn single(value: f64) -> Result<Self, RimError> {
        Self::new(value, value, 1)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_degenerate(&self) -> bool {
        self.count == 1
    }

    /// The axis values, ascending; the last value is exactly `max`.
    pub fn values(&self) -> Vec<f64> {
        if self.count == 1 {
            return vec![self.min];
        }

        let span = self.max - self.min;
        let last = (self.count - 1) as f64;
        (0..self.count)
            .map(|i| {
                if i + 1 == self.count {
                    self.max
                } else {
                    self.min + span * (i as f64) / last
                }
            })
            .collect()
    }
}

impl TryFrom<&RateRangeConfig> for RateRange {
    type Error = RimError;

    fn try_from(config: &RateRangeConfig) -> Result<Self, Self::Error> {
        Self::new(config.min, config.max, config.count)
    }
}

/// Discount-rate and growth-rate axes of a valuation grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValuationGridConfig {
    discount_rate: RateRange,
    growth_rate: RateRange,
}

impl ValuationGridConfig {
    pub fn new(discount_rate: RateRange, growth_rate: RateRange) -> Result<Self, RimError> {
        // (1 + r) must stay positive for discounting to mean anything
        if discount_rate.min() <= -1.0 {
            return Err(RimError::InvalidConfig(format!(
                "discount rate {} must be greater than -1",
                discount_rate.min()
            )));
        }

        let cells = discount_rate.count() * growth_rate.count();
        if cells > MAX_GRID_CELLS {
            return Err(RimError::InvalidConfig(format!(
                "grid of {} x {} cells exceeds limit {}",
                discount_rate.count(),
                growth_rate.count(),
                MAX_GRID_CELLS
            )));
        }

        Ok(Self {
            discount_rate,
            growth_rate,
        })
    }

    /// Grid axes from the configured defaults.
    pub fn from_config(config: &ValuationConfig) -> Result<Self, RimError> {
        Self::new(
            RateRange::try_from(&config.discount_rate)?,
            RateRange::try_from(&config.growth_rate)?,
        )
    }

    pub fn discount_rate(&self) -> &RateRange {
        &self.discount_rate
    }

    pub fn growth_rate(&self) -> &RateRange {
        &self.growth_rate
    }
}

// ============================================================================
// Grid Result Types
// ============================================================================

/// Valuation at one (required return, growth rate) point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationCell {
    /// Required return / discount rate (必要报酬率)
    #[serde(rename = "rr")]
    pub required_return: f64,
    /// Terminal growth rate of residual income (持续期增长率)
    #[serde(rename = "gr")]
    pub growth_rate: f64,
    /// Intrinsic value per share
    pub value: f64,
    pub discounted_ri_y1: f64,
    pub discounted_ri_y2: f64,
    pub discounted_ri_y3: f64,
    /// Discounted continuing value (折现后的持续期剩余收益)
    pub discounted_cv: f64,
}

/// Full sensitivity table for one company.
///
/// Cells are ordered discount rate outer, growth rate inner; pairs with
/// `rr <= gr` are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationGrid {
    pub code: CompanyCode,
    pub bps_base: f64,
    #[serde(rename = "rr")]
    pub discount_rates: Vec<f64>,
    #[serde(rename = "gr")]
    pub growth_rates: Vec<f64>,
    pub cells: Vec<ValuationCell>,
}

impl ValuationGrid {
    /// Look up the cell at exact axis values.
    pub fn cell(&self, required_return: f64, growth_rate: f64) -> Option<&ValuationCell> {
        self.cells
            .iter()
            .find(|c| c.required_return == required_return && c.growth_rate == growth_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
