//! RIM Valuation Engine.
//!
//! Residual income model (剩余收益模型) valuation of A-share companies in two
//! steps:
//!
//! 1. **Proposal**: resolve base-year book value and EPS, three years of
//!    forecast EPS and the industry ROE into one immutable record
//!    (cached per company code).
//! 2. **Grid**: value the proposal over a discount-rate × growth-rate
//!    sensitivity table.
//!
//! # Usage
//!
//! ```ignore
//! use aqi_valuation::valuation::{compute_grid, ProposalBuilder, ValuationGridConfig};
//!
//! let builder = ProposalBuilder::from_store(store, settings);
//! let proposal = builder.build_for("000625").await?;
//! let axes = ValuationGridConfig::from_config(&config.valuation)?;
//! let grid = compute_grid(&proposal, &axes)?;
//!
//! for cell in &grid.cells {
//!     println!("r={:.2} g={:.2} value={:.2}", cell.required_return, cell.growth_rate, cell.value);
//! }
//! ```

pub mod cache;
pub mod error;
pub mod grid;
pub mod proposal;
pub mod types;

pub use cache::{CacheStats, ProposalCache};
pub use error::{MissingFact, RimError};
pub use grid::{compute_grid, residual_income_schedule, value_cell, ResidualIncomeSchedule};
pub use proposal::{normalize_forecast, ProposalBuilder, ProposalSettings};
pub use types::{
    CompanyCode, RateRange, ValuationCell, ValuationGrid, ValuationGridConfig, ValuationProposal,
    FORECAST_YEARS,
};
