//! Configuration validation for AQI services.
//!
//! Provides validation logic for configuration fields to ensure
//! all required values are present and within valid ranges.

use thiserror::Error;

use crate::config::{
    Config, DataConfig, ObservabilityConfig, RateRangeConfig, ServiceConfig, ValuationConfig,
    MAX_GRID_CELLS, MAX_RANGE_POINTS,
};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port}: must be between 1 and 65535")]
    InvalidPort { port: u16, field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let sections: [&dyn Validate; 4] = [
            &self.service,
            &self.observability,
            &self.data,
            &self.valuation,
        ];

        let mut errors: Vec<ValidationError> = sections
            .iter()
            .filter_map(|section| section.validate().err())
            .collect();

        if self.network.bind.trim().is_empty() {
            errors.push(ValidationError::MissingField {
                field: "network.bind".into(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }

    /// Load with environment overrides and validate.
    pub fn load_and_validate() -> anyhow::Result<Self> {
        let config = Self::load_with_env()?;
        config.validate().map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(config)
    }
}

impl Validate for ServiceConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                port: self.port,
                field: "service.port".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        const FORMATS: &[&str] = &["json", "pretty"];

        // Levels may carry directives ("info,aqi_valuation=debug"); check the base only
        let base_level = self.log_level.split(',').next().unwrap_or_default();
        if !LEVELS.contains(&base_level.to_lowercase().as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_level".into(),
                reason: format!("unknown level '{}'", self.log_level),
            });
        }

        if !FORMATS.contains(&self.log_format.as_str()) {
            return Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected one of {:?}", FORMATS),
            });
        }

        Ok(())
    }
}

impl Validate for DataConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ValidationError::MissingField {
                field: "data.db_path".into(),
            });
        }

        let period = self.base_period.as_str();
        if period.len() != 4 || !period.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidValue {
                field: "data.base_period".into(),
                reason: format!("'{}' is not a four-digit fiscal year", period),
            });
        }

        Ok(())
    }
}

impl Validate for ValuationConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.cache_capacity == 0 {
            return Err(ValidationError::InvalidValue {
                field: "valuation.cache_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }

        validate_range(&self.discount_rate, "valuation.discount_rate")?;
        validate_range(&self.growth_rate, "valuation.growth_rate")?;

        let cells = self.discount_rate.count.saturating_mul(self.growth_rate.count);
        if cells > MAX_GRID_CELLS {
            return Err(ValidationError::InvalidValue {
                field: "valuation".into(),
                reason: format!("default grid has {} cells, limit is {}", cells, MAX_GRID_CELLS),
            });
        }

        validate_point(
            self.default_discount_rate,
            &self.discount_rate,
            "valuation.default_discount_rate",
        )?;
        validate_point(
            self.default_growth_rate,
            &self.growth_rate,
            "valuation.default_growth_rate",
        )
    }
}

fn validate_range(range: &RateRangeConfig, field: &str) -> ValidationResult<()> {
    let reason = if !range.min.is_finite() || !range.max.is_finite() {
        Some("bounds must be finite".to_string())
    } else if range.min > range.max {
        Some(format!("min {} exceeds max {}", range.min, range.max))
    } else if range.count == 0 {
        Some("count must be at least 1".to_string())
    } else if range.min < range.max && range.count < 2 {
        Some("a non-degenerate range needs at least 2 points".to_string())
    } else if range.count > MAX_RANGE_POINTS {
        Some(format!("count {} exceeds limit {}", range.count, MAX_RANGE_POINTS))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ValidationError::InvalidValue {
            field: field.into(),
            reason,
        }),
        None => Ok(()),
    }
}

fn validate_point(value: f64, range: &RateRangeConfig, field: &str) -> ValidationResult<()> {
    if !value.is_finite() || value < range.min || value > range.max {
        return Err(ValidationError::InvalidValue {
            field: field.into(),
            reason: format!("{} is outside [{}, {}]", value, range.min, range.max),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = Config::default();
        config.service.port = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidPort { port: 0, .. })
        ));
    }

    #[test]
    fn test_zero_cache_capacity_rejected() {
        let mut config = Config::default();
        config.valuation.cache_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("valuation.cache_capacity"));
    }

    #[test_case(0.13, 0.07, 7 ; "inverted")]
    #[test_case(0.07, 0.13, 0 ; "empty")]
    #[test_case(0.07, 0.13, 1 ; "single point over a span")]
    #[test_case(f64::NAN, 0.13, 7 ; "nan bound")]
    #[test_case(0.07, 0.13, MAX_RANGE_POINTS + 1 ; "too many points")]
    #[test_case(0.07, 0.13, usize::MAX ; "count at usize max")]
    fn test_bad_discount_range_rejected(min: f64, max: f64, count: usize) {
        let mut config = Config::default();
        config.valuation.discount_rate = RateRangeConfig { min, max, count };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_default_grid_rejected() {
        let mut config = Config::default();
        config.valuation.discount_rate.count = MAX_RANGE_POINTS;
        config.valuation.growth_rate.count = MAX_RANGE_POINTS;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cells"));
    }

    #[test_case(0.20 ; "above range")]
    #[test_case(f64::NAN ; "nan")]
    fn test_default_discount_rate_outside_range_rejected(rate: f64) {
        let mut config = Config::default();
        config.valuation.default_discount_rate = rate;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("valuation.default_discount_rate"));
    }

    #[test]
    fn test_degenerate_range_accepted() {
        let mut config = Config::default();
        config.valuation.growth_rate = RateRangeConfig {
            min: 0.02,
            max: 0.02,
            count: 1,
        };
        assert!(config.validate().is_ok());
    }

    #[test_case("18" ; "too short")]
    #[test_case("2018Q4" ; "too long")]
    #[test_case("20a8" ; "non digit")]
    fn test_bad_base_period_rejected(period: &str) {
        let mut config = Config::default();
        config.data.base_period = period.to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.service.port = 0;
        config.observability.log_format = "xml".into();
        config.valuation.cache_capacity = 0;

        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {:?}", other),
        }
    }

    #[test]
    fn test_log_level_with_directives() {
        let mut config = Config::default();
        config.observability.log_level = "debug,hyper=warn".into();
        assert!(config.validate().is_ok());
    }
}
