//! Proposal Builder.
//!
//! Resolves the facts the residual income model needs for one company and
//! assembles them into a [`ValuationProposal`]:
//!
//! - base-period book value per share and EPS (`IndicatorSource`)
//! - three years of analyst EPS forecasts (`ForecastSource`)
//! - industry classification and its benchmark ROE (`IndustrySource`)
//!
//! Built proposals are kept in a [`ProposalCache`] owned by the builder.

use chrono::NaiveDate;
use std::sync::Arc;

use super::cache::ProposalCache;
use super::error::{MissingFact, RimError};
use super::types::{CompanyCode, ValuationProposal, FORECAST_YEARS};
use crate::data::{
    EpsForecast, ForecastSource, Indicator, IndicatorSource, IndustryRoe, IndustrySource,
};
use aqi_common::config::Config;

/// Which data snapshot proposals are built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProposalSettings {
    /// Fiscal period of the base-year indicators (e.g. "2018")
    pub base_period: String,
    /// Date of the analyst forecast snapshot
    pub forecast_as_of: NaiveDate,
    /// Maximum number of cached proposals
    pub cache_capacity: usize,
}

impl ProposalSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            base_period: config.data.base_period.clone(),
            forecast_as_of: config.data.forecast_as_of,
            cache_capacity: config.valuation.cache_capacity,
        }
    }
}

impl Default for ProposalSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Builds and caches valuation proposals.
pub struct ProposalBuilder {
    indicators: Arc<dyn IndicatorSource>,
    forecasts: Arc<dyn ForecastSource>,
    industries: Arc<dyn IndustrySource>,
    settings: ProposalSettings,
    cache: ProposalCache,
}

impl ProposalBuilder {
    /// Create a builder over explicit lookup sources, with an empty cache.
    pub fn new(
        indicators: Arc<dyn IndicatorSource>,
        forecasts: Arc<dyn ForecastSource>,
        industries: Arc<dyn IndustrySource>,
        settings: ProposalSettings,
    ) -> Self {
        let cache = ProposalCache::new(settings.cache_capacity);
        Self {
            indicators,
            forecasts,
            industries,
            settings,
            cache,
        }
    }

    /// Create a builder reading every fact from one store.
    pub fn from_store<S>(store: Arc<S>, settings: ProposalSettings) -> Self
    where
        S: IndicatorSource + ForecastSource + IndustrySource + 'static,
    {
        Self::new(store.clone(), store.clone(), store, settings)
    }

    pub fn settings(&self) -> &ProposalSettings {
        &self.settings
    }

    pub fn cache(&self) -> &ProposalCache {
        &self.cache
    }

    /// Build the proposal for a raw code string.
    pub async fn build_for(&self, raw: &str) -> Result<Arc<ValuationProposal>, RimError> {
        let code = CompanyCode::parse(raw)?;
        self.build(&code).await
    }

    /// Get the proposal for a company, building it on a cache miss.
    pub async fn build(&self, code: &CompanyCode) -> Result<Arc<ValuationProposal>, RimError> {
        if let Some(proposal) = self.cache.get(code) {
            tracing::debug!(code = %code, "Proposal cache hit");
            return Ok(proposal);
        }

        tracing::debug!(code = %code, "Proposal cache miss");
        let proposal = Arc::new(self.build_uncached(code).await?);

        if let Some(evicted) = self.cache.insert(proposal.clone()) {
            tracing::debug!(code = %code, evicted = %evicted, "Evicted proposal");
        }

        Ok(proposal)
    }

    /// Build a fresh proposal, bypassing and leaving the cache untouched.
    pub async fn build_uncached(&self, code: &CompanyCode) -> Result<ValuationProposal, RimError> {
        let (indicator, forecast, industry) =
            tokio::try_join!(self.indicator(code), self.eps_forecast(code), self.industry(code))?;

        let bps_base = required(code, MissingFact::BookValuePerShare, indicator.book_value_per_share)?;
        let eps_base = required(code, MissingFact::EarningsPerShare, indicator.earnings_per_share)?;
        let industry_roe = required(code, MissingFact::IndustryRoe, Some(industry.roe))?;

        let proposal = ValuationProposal {
            code: code.clone(),
            bps_base,
            eps_base,
            industry_roe,
            eps_forecast: normalize_forecast(&forecast),
        };

        tracing::info!(
            code = %code,
            industry = %industry.industry_code,
            bps_base,
            eps_base,
            industry_roe,
            "Built valuation proposal"
        );

        Ok(proposal)
    }

    /// Drop the cached proposal of a company so the next build re-fetches.
    pub fn invalidate(&self, code: &CompanyCode) -> bool {
        let removed = self.cache.invalidate(code);
        if removed {
            tracing::info!(code = %code, "Invalidated cached proposal");
        }
        removed
    }

    /// Base-period indicators of one company.
    pub async fn indicator(&self, code: &CompanyCode) -> Result<Indicator, RimError> {
        self.indicators
            .indicator(&self.settings.base_period, code)
            .await
            .map_err(|e| RimError::unavailable(code, MissingFact::BookValuePerShare, e))
    }

    /// Raw forecast row of one company, missing values kept as `None`.
    pub async fn eps_forecast(&self, code: &CompanyCode) -> Result<EpsForecast, RimError> {
        self.forecasts
            .eps_forecast(self.settings.forecast_as_of, code)
            .await
            .map_err(|e| RimError::unavailable(code, MissingFact::EarningsForecast, e))
    }

    async fn industry(&self, code: &CompanyCode) -> Result<IndustryRoe, RimError> {
        let industry_code = self
            .industries
            .industry_code(code)
            .await
            .map_err(|e| RimError::unavailable(code, MissingFact::IndustryCode, e))?;

        self.industries
            .industry_roe(&industry_code)
            .await
            .map_err(|e| RimError::unavailable(code, MissingFact::IndustryRoe, e))
    }
}

fn required(code: &CompanyCode, fact: MissingFact, value: Option<f64>) -> Result<f64, RimError> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        Some(v) => Err(RimError::unavailable(code, fact, format!("non-finite value {}", v))),
        None => Err(RimError::unavailable(code, fact, "value is missing")),
    }
}

/// Forecast EPS as used by the model.
///
/// A missing or non-finite forecast year counts as zero earnings for that
/// year: the year contributes no growth, only the capital charge on book
/// value. This is a valuation rule applied here and nowhere else; base-year
/// facts are never defaulted.
pub fn normalize_forecast(forecast: &EpsForecast) -> [f64; FORECAST_YEARS] {
    forecast
        .years()
        .map(|year| year.filter(|v| v.is_finite()).unwrap_or(0.0))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ProviderError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory snapshot counting every lookup
    #[derive(Default)]
    struct Snapshot {
        indicators: HashMap<CompanyCode, Indicator>,
        forecasts: HashMap<CompanyCode, EpsForecast>,
        members: HashMap<CompanyCode, String>,
        industries: HashMap<String, IndustryRoe>,
        calls: AtomicU32,
    }

    impl Snapshot {
        fn with_company(code: &str, bps: Option<f64>, forecast: EpsForecast) -> Self {
            let code: CompanyCode = code.parse().unwrap();
            let mut snapshot = Self::default();
            snapshot.indicators.insert(
                code.clone(),
                Indicator {
                    book_value_per_share: bps,
                    earnings_per_share: Some(1.0),
                },
            );
            snapshot.forecasts.insert(code.clone(), forecast);
            snapshot.members.insert(code, "801750".into());
            snapshot.industries.insert(
                "801750".into(),
                IndustryRoe {
                    industry_code: "801750".into(),
                    industry_name: "计算机设备".into(),
                    roe: 0.12,
                },
            );
            snapshot
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IndicatorSource for Snapshot {
        async fn indicators(
            &self,
            _period: &str,
        ) -> Result<HashMap<CompanyCode, Indicator>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.indicators.clone())
        }
    }

    #[async_trait]
    impl ForecastSource for Snapshot {
        async fn eps_forecasts(
            &self,
            _as_of: NaiveDate,
        ) -> Result<HashMap<CompanyCode, EpsForecast>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.forecasts.clone())
        }
    }

    #[async_trait]
    impl IndustrySource for Snapshot {
        async fn industry_code(&self, code: &CompanyCode) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.members
                .get(code)
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(code.to_string()))
        }

        async fn industry_roe(&self, industry_code: &str) -> Result<IndustryRoe, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.industries
                .get(industry_code)
                .cloned()
                .ok_or_else(|| ProviderError::NotFound(industry_code.to_string()))
        }
    }

    fn builder(snapshot: Snapshot) -> (ProposalBuilder, Arc<Snapshot>) {
        let store = Arc::new(snapshot);
        let builder = ProposalBuilder::from_store(store.clone(), ProposalSettings::default());
        (builder, store)
    }

    #[tokio::test]
    async fn test_build_assembles_facts() {
        let forecast = EpsForecast::from_raw(1.1, 1.3, 1.4);
        let (builder, _) = builder(Snapshot::with_company("000625", Some(8.12), forecast));

        let proposal = builder.build_for("000625").await.unwrap();
        assert_eq!(proposal.bps_base, 8.12);
        assert_eq!(proposal.eps_base, 1.0);
        assert_eq!(proposal.industry_roe, 0.12);
        assert_eq!(proposal.eps_forecast, [1.1, 1.3, 1.4]);
    }

    #[tokio::test]
    async fn test_missing_forecast_years_become_zero() {
        let forecast = EpsForecast::from_raw(1.1, f64::NAN, f64::NAN);
        let (builder, _) = builder(Snapshot::with_company("000625", Some(8.12), forecast));

        let proposal = builder.build_for("000625").await.unwrap();
        assert_eq!(proposal.eps_forecast, [1.1, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_missing_base_bps_is_not_defaulted() {
        let forecast = EpsForecast::from_raw(1.1, 1.3, 1.4);
        let (builder, _) = builder(Snapshot::with_company("000625", None, forecast));

        let err = builder.build_for("000625").await.unwrap_err();
        assert!(matches!(
            err,
            RimError::DataUnavailable {
                fact: MissingFact::BookValuePerShare,
                ..
            }
        ));
        assert!(builder.cache().stats().entries == 0);
    }

    #[tokio::test]
    async fn test_second_build_is_served_from_cache() {
        let forecast = EpsForecast::from_raw(1.1, 1.3, 1.4);
        let (builder, store) = builder(Snapshot::with_company("000625", Some(8.12), forecast));

        let first = builder.build_for("000625").await.unwrap();
        let calls = store.calls();
        let second = builder.build_for("000625").await.unwrap();

        assert_eq!(store.calls(), calls);
        assert!(Arc::ptr_eq(&first, &second));

        assert!(builder.invalidate(&first.code));
        let third = builder.build_for("000625").await.unwrap();
        assert!(store.calls() > calls);
        assert_eq!(*first, *third);
    }

    #[tokio::test]
    async fn test_invalid_code_does_no_lookup() {
        let (builder, store) = builder(Snapshot::default());
        let err = builder.build_for("999999").await.unwrap_err();
        assert!(matches!(err, RimError::InvalidIdentifier { .. }));
        assert_eq!(store.calls(), 0);
    }

    #[test]
    fn test_default_settings_follow_config_defaults() {
        let settings = ProposalSettings::default();
        assert_eq!(settings, ProposalSettings::from_config(&Config::default()));
        assert_eq!(settings.cache_capacity, 4096);
        assert_eq!(settings.base_period, "2018");
    }

    #[test]
    fn test_normalize_forecast() {
        let forecast = EpsForecast {
            eps_y1: Some(0.5),
            eps_y2: None,
            eps_y3: Some(f64::INFINITY),
        };
        assert_eq!(normalize_forecast(&forecast), [0.5, 0.0, 0.0]);
    }
}
