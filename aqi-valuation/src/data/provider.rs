//! Lookup contracts for accounting data.
//!
//! The valuation engine reads company facts only through these traits, so
//! the backing store (SQLite snapshot, a remote API, a test double) can be
//! swapped without touching the engine.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;

use super::{EpsForecast, Indicator, IndustryRoe};
use crate::valuation::CompanyCode;

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// The requested row does not exist in the snapshot
    NotFound(String),
    /// The backing store failed (query error, corrupt row)
    Storage(String),
    /// Provider is temporarily unavailable
    Unavailable(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Data not found: {}", msg),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
            Self::Unavailable(msg) => write!(f, "Provider unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<rusqlite::Error> for ProviderError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound("no matching row".into()),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl ProviderError {
    /// Check if the error means "the row is absent" rather than "the lookup broke"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// Lookup Traits
// ============================================================================

/// Accounting fundamentals per fiscal period.
#[async_trait]
pub trait IndicatorSource: Send + Sync {
    /// All companies' indicators for a fiscal period (e.g. "2018").
    async fn indicators(
        &self,
        period: &str,
    ) -> Result<HashMap<CompanyCode, Indicator>, ProviderError>;

    /// Indicators of one company for a fiscal period.
    ///
    /// Default implementation filters `indicators`; stores that can query a
    /// single row should override it.
    async fn indicator(&self, period: &str, code: &CompanyCode) -> Result<Indicator, ProviderError> {
        self.indicators(period)
            .await?
            .remove(code)
            .ok_or_else(|| ProviderError::NotFound(format!("indicators of {} for {}", code, period)))
    }
}

/// Analyst EPS forecast snapshots.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// All companies' forecasts in the snapshot taken on `as_of`.
    async fn eps_forecasts(
        &self,
        as_of: NaiveDate,
    ) -> Result<HashMap<CompanyCode, EpsForecast>, ProviderError>;

    /// Forecast of one company in the snapshot taken on `as_of`.
    async fn eps_forecast(
        &self,
        as_of: NaiveDate,
        code: &CompanyCode,
    ) -> Result<EpsForecast, ProviderError> {
        self.eps_forecasts(as_of)
            .await?
            .remove(code)
            .ok_or_else(|| ProviderError::NotFound(format!("EPS forecast of {} as of {}", code, as_of)))
    }
}

/// Industry classification and industry ROE benchmarks.
#[async_trait]
pub trait IndustrySource: Send + Sync {
    /// Resolve the industry classification code of a company.
    async fn industry_code(&self, code: &CompanyCode) -> Result<String, ProviderError>;

    /// Benchmark ROE of an industry.
    async fn industry_roe(&self, industry_code: &str) -> Result<IndustryRoe, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct MapSource(HashMap<CompanyCode, Indicator>);

    #[async_trait]
    impl IndicatorSource for MapSource {
        async fn indicators(
            &self,
            _period: &str,
        ) -> Result<HashMap<CompanyCode, Indicator>, ProviderError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_default_indicator_lookup() {
        let code: CompanyCode = "000625".parse().unwrap();
        let source = MapSource(HashMap::from([(
            code.clone(),
            Indicator {
                book_value_per_share: Some(8.12),
                earnings_per_share: Some(1.0),
            },
        )]));

        let found = source.indicator("2018", &code).await.unwrap();
        assert_eq!(found.book_value_per_share, Some(8.12));

        let other: CompanyCode = "600519".parse().unwrap();
        let err = source.indicator("2018", &other).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("600519"));
    }

    #[test]
    fn test_rusqlite_error_mapping() {
        let err: ProviderError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(err.is_not_found());

        let err: ProviderError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, ProviderError::Storage(_)));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Unavailable("maintenance".into());
        assert_eq!(err.to_string(), "Provider unavailable: maintenance");
    }
}
