//! HTTP routes for the valuation service.

use aqi_common::logging::generate_trace_id;
use aqi_common::{request_span, Error};
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    response::Json,
    routing::get,
    Router,
};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument;

use crate::valuation::{
    compute_grid, CacheStats, CompanyCode, RateRange, RimError, ValuationCell,
    ValuationGridConfig, ValuationProposal,
};
use crate::ValuationState;

type ApiResult = aqi_common::Result<Json<Value>>;

/// Build the application router.
pub fn build_router(state: Arc<ValuationState>) -> Router {
    Router::new()
        .route("/health", get(health))
        // RIM
        .route("/api/v1/rim/proposal", get(get_proposal))
        .route("/api/v1/rim/proposal/:code", axum::routing::delete(invalidate_proposal))
        .route("/api/v1/rim/value", get(get_value))
        .route("/api/v1/rim/cache", get(get_cache_stats))
        // Raw facts
        .route("/api/v1/indicator", get(get_indicator))
        .route("/api/v1/profit-forecast", get(get_profit_forecast))
        .with_state(state)
}

fn success(data: impl Serialize) -> ApiResult {
    Ok(Json(serde_json::json!({
        "success": true,
        "data": data
    })))
}

fn log_failure(err: &RimError) {
    if err.is_client_error() {
        tracing::warn!(error = %err, "Request rejected");
    } else {
        tracing::error!(error = %err, "Valuation failed");
    }
}

/// Query string extractor whose rejection uses the JSON error envelope.
pub struct ApiQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => {
                let reason = rejection.body_text();
                tracing::warn!(error = %reason, "Malformed query string");
                Err(Error::InvalidInput(reason))
            }
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    pub code: String,
}

/// Grid query; any omitted bound or count falls back to the configured range.
///
/// An axis is sized either by `*_count` or by `*_step`, never both.
#[derive(Debug, Default, Deserialize)]
pub struct ValueQuery {
    pub code: String,
    pub rr_min: Option<f64>,
    pub rr_max: Option<f64>,
    pub rr_count: Option<usize>,
    pub rr_step: Option<f64>,
    pub gr_min: Option<f64>,
    pub gr_max: Option<f64>,
    pub gr_count: Option<usize>,
    pub gr_step: Option<f64>,
}

/// One axis as given on the query string.
struct AxisQuery {
    name: &'static str,
    min: Option<f64>,
    max: Option<f64>,
    count: Option<usize>,
    step: Option<f64>,
}

impl AxisQuery {
    fn resolve(&self, base: &RateRange) -> Result<RateRange, RimError> {
        let min = self.min.unwrap_or(base.min());
        let max = self.max.unwrap_or(base.max());

        match (self.count, self.step) {
            (Some(_), Some(_)) => Err(RimError::InvalidConfig(format!(
                "{0}_count and {0}_step are mutually exclusive",
                self.name
            ))),
            (None, Some(step)) => RateRange::with_step(min, max, step),
            (count, None) => RateRange::new(min, max, count.unwrap_or(base.count())),
        }
    }
}

impl ValueQuery {
    /// Grid axes for this query, completed from `defaults`.
    pub fn grid_config(&self, defaults: &ValuationGridConfig) -> Result<ValuationGridConfig, RimError> {
        let discount = AxisQuery {
            name: "rr",
            min: self.rr_min,
            max: self.rr_max,
            count: self.rr_count,
            step: self.rr_step,
        };
        let growth = AxisQuery {
            name: "gr",
            min: self.gr_min,
            max: self.gr_max,
            count: self.gr_count,
            step: self.gr_step,
        };

        ValuationGridConfig::new(
            discount.resolve(defaults.discount_rate())?,
            growth.resolve(defaults.growth_rate())?,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ProposalResponse {
    pub proposal: ValuationProposal,
    /// Grid axes used when a value request omits them
    pub defaults: ValuationGridConfig,
    /// Suggested single discount rate
    pub default_discount_rate: f64,
    /// Suggested single growth rate
    pub default_growth_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct ValueResponse {
    pub code: CompanyCode,
    pub bps_base: f64,
    pub rr: Vec<f64>,
    pub gr: Vec<f64>,
    pub cells: Vec<ValuationCell>,
}

#[derive(Debug, Serialize)]
pub struct IndicatorResponse {
    pub code: CompanyCode,
    pub period: String,
    pub book_value_per_share: Option<f64>,
    pub earnings_per_share: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub code: CompanyCode,
    pub as_of: NaiveDate,
    pub eps_y1: Option<f64>,
    pub eps_y2: Option<f64>,
    pub eps_y3: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub code: CompanyCode,
    pub invalidated: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "aqi-valuation".to_string(),
    })
}

/// Proposal for a company plus the default grid ranges.
pub async fn get_proposal(
    State(state): State<Arc<ValuationState>>,
    ApiQuery(query): ApiQuery<CodeQuery>,
) -> ApiResult {
    let span = request_span!("rim_proposal", generate_trace_id(), code = %query.code);

    async move {
        let proposal = state.builder.build_for(&query.code).await.inspect_err(log_failure)?;

        success(ProposalResponse {
            proposal: (*proposal).clone(),
            defaults: state.grid_defaults,
            default_discount_rate: state.config.valuation.default_discount_rate,
            default_growth_rate: state.config.valuation.default_growth_rate,
        })
    }
    .instrument(span)
    .await
}

/// Valuation grid for a company.
pub async fn get_value(
    State(state): State<Arc<ValuationState>>,
    ApiQuery(query): ApiQuery<ValueQuery>,
) -> ApiResult {
    let span = request_span!("rim_value", generate_trace_id(), code = %query.code);

    async move {
        let code = CompanyCode::parse(&query.code).inspect_err(log_failure)?;
        let config = query.grid_config(&state.grid_defaults).inspect_err(log_failure)?;
        let proposal = state.builder.build(&code).await.inspect_err(log_failure)?;
        let grid = compute_grid(&proposal, &config).inspect_err(log_failure)?;

        tracing::info!(cells = grid.cells.len(), "Valuation grid served");

        success(ValueResponse {
            code: grid.code,
            bps_base: grid.bps_base,
            rr: grid.discount_rates,
            gr: grid.growth_rates,
            cells: grid.cells,
        })
    }
    .instrument(span)
    .await
}

/// Base-period indicator row of a company.
pub async fn get_indicator(
    State(state): State<Arc<ValuationState>>,
    ApiQuery(query): ApiQuery<CodeQuery>,
) -> ApiResult {
    let span = request_span!("indicator", generate_trace_id(), code = %query.code);

    async move {
        let code = CompanyCode::parse(&query.code).inspect_err(log_failure)?;
        let indicator = state.builder.indicator(&code).await.inspect_err(log_failure)?;

        success(IndicatorResponse {
            code,
            period: state.builder.settings().base_period.clone(),
            book_value_per_share: indicator.book_value_per_share,
            earnings_per_share: indicator.earnings_per_share,
        })
    }
    .instrument(span)
    .await
}

/// Raw forecast row of a company; missing years are `null`.
pub async fn get_profit_forecast(
    State(state): State<Arc<ValuationState>>,
    ApiQuery(query): ApiQuery<CodeQuery>,
) -> ApiResult {
    let span = request_span!("profit_forecast", generate_trace_id(), code = %query.code);

    async move {
        let code = CompanyCode::parse(&query.code).inspect_err(log_failure)?;
        let forecast = state.builder.eps_forecast(&code).await.inspect_err(log_failure)?;

        success(ForecastResponse {
            code,
            as_of: state.builder.settings().forecast_as_of,
            eps_y1: forecast.eps_y1,
            eps_y2: forecast.eps_y2,
            eps_y3: forecast.eps_y3,
        })
    }
    .instrument(span)
    .await
}

/// Drop a cached proposal so the next request rebuilds it.
pub async fn invalidate_proposal(
    State(state): State<Arc<ValuationState>>,
    Path(code): Path<String>,
) -> ApiResult {
    let span = request_span!("rim_invalidate", generate_trace_id(), code = %code);

    async move {
        let code = CompanyCode::parse(&code).inspect_err(log_failure)?;
        let invalidated = state.builder.invalidate(&code);
        tracing::info!(invalidated, "Proposal cache entry dropped");
        success(InvalidateResponse { code, invalidated })
    }
    .instrument(span)
    .await
}

pub async fn get_cache_stats(State(state): State<Arc<ValuationState>>) -> ApiResult {
    let span = request_span!("rim_cache_stats", generate_trace_id());

    async move {
        let stats: CacheStats = state.builder.cache().stats();
        tracing::debug!(entries = stats.entries, hits = stats.hits, "Cache stats served");
        success(stats)
    }
    .instrument(span)
    .await
}

// ============================================================================
// Tests
// ============================================================================
