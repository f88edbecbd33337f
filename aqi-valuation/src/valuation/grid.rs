//! Valuation Grid Calculator.
//!
//! Residual income model with a three-year explicit horizon:
//!
//! ```text
//! bv[0] = bps_base
//! RI[t] = eps[t] - r * bv[t-1]             (t = 1..3)
//! bv[t] = bv[t-1] + eps[t]                 (clean surplus, no payout)
//! CV    = RI[3] * (1 + g) / (r - g)        (valued at end of year 3)
//! value = bv[0] + Σ RI[t] / (1+r)^t + CV / (1+r)^3
//! ```
//!
//! Evaluated over the cross product of the discount-rate and growth-rate
//! axes; pairs with `r <= g` have no finite perpetuity and are left out.

use super::error::RimError;
use super::types::{
    ValuationCell, ValuationGrid, ValuationGridConfig, ValuationProposal, FORECAST_YEARS,
};

/// Residual income of each explicit year at required return `r`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResidualIncomeSchedule {
    /// Book value at the start of each year
    pub opening_book_value: [f64; FORECAST_YEARS],
    pub residual_income: [f64; FORECAST_YEARS],
}

/// Roll book value forward and charge capital at rate `r`.
pub fn residual_income_schedule(proposal: &ValuationProposal, r: f64) -> ResidualIncomeSchedule {
    let mut opening_book_value = [0.0; FORECAST_YEARS];
    let mut residual_income = [0.0; FORECAST_YEARS];

    let mut book_value = proposal.bps_base;
    for (t, eps) in proposal.eps_forecast.iter().enumerate() {
        opening_book_value[t] = book_value;
        residual_income[t] = eps - r * book_value;
        book_value += eps;
    }

    ResidualIncomeSchedule {
        opening_book_value,
        residual_income,
    }
}

/// Value one (r, g) point. Returns `None` when `r <= g`.
pub fn value_cell(proposal: &ValuationProposal, r: f64, g: f64) -> Option<ValuationCell> {
    if r <= g {
        return None;
    }

    let schedule = residual_income_schedule(proposal, r);
    let growth = 1.0 + r;

    let mut discounted = [0.0; FORECAST_YEARS];
    for (t, ri) in schedule.residual_income.iter().enumerate() {
        discounted[t] = ri / growth.powi(t as i32 + 1);
    }

    let terminal_ri = schedule.residual_income[FORECAST_YEARS - 1] * (1.0 + g);
    let continuing_value = terminal_ri / (r - g);
    let discounted_cv = continuing_value / growth.powi(FORECAST_YEARS as i32);

    let value = proposal.bps_base + discounted.iter().sum::<f64>() + discounted_cv;

    Some(ValuationCell {
        required_return: r,
        growth_rate: g,
        value,
        discounted_ri_y1: discounted[0],
        discounted_ri_y2: discounted[1],
        discounted_ri_y3: discounted[2],
        discounted_cv,
    })
}

/// Compute the full sensitivity grid for a proposal.
///
/// Fails only when the proposal itself is malformed (a non-finite book value
/// or forecast); an all-invalid `(r, g)` region yields an empty grid.
pub fn compute_grid(
    proposal: &ValuationProposal,
    config: &ValuationGridConfig,
) -> Result<ValuationGrid, RimError> {
    check_proposal(proposal)?;

    let discount_rates = config.discount_rate().values();
    let growth_rates = config.growth_rate().values();

    let cells: Vec<ValuationCell> = discount_rates
        .iter()
        .flat_map(|&r| growth_rates.iter().filter_map(move |&g| value_cell(proposal, r, g)))
        .collect();

    tracing::debug!(
        code = %proposal.code,
        discount_rates = discount_rates.len(),
        growth_rates = growth_rates.len(),
        cells = cells.len(),
        "Computed valuation grid"
    );

    Ok(ValuationGrid {
        code: proposal.code.clone(),
        bps_base: proposal.bps_base,
        discount_rates,
        growth_rates,
        cells,
    })
}

fn check_proposal(proposal: &ValuationProposal) -> Result<(), RimError> {
    let malformed = |reason: String| RimError::MalformedProposal {
        code: proposal.code.clone(),
        reason,
    };

    if !proposal.bps_base.is_finite() {
        return Err(malformed(format!("base book value is {}", proposal.bps_base)));
    }
    if let Some((year, eps)) = proposal
        .eps_forecast
        .iter()
        .enumerate()
        .find(|(_, eps)| !eps.is_finite())
    {
        return Err(malformed(format!("forecast EPS of year {} is {}", year + 1, eps)));
    }

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
