//! Error types for the valuation engine.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use super::types::CompanyCode;

/// A company fact the proposal builder could not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFact {
    BookValuePerShare,
    EarningsPerShare,
    EarningsForecast,
    IndustryCode,
    IndustryRoe,
}

impl fmt::Display for MissingFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BookValuePerShare => write!(f, "book value per share"),
            Self::EarningsPerShare => write!(f, "earnings per share"),
            Self::EarningsForecast => write!(f, "earnings forecast"),
            Self::IndustryCode => write!(f, "industry classification"),
            Self::IndustryRoe => write!(f, "industry ROE"),
        }
    }
}

/// Valuation engine errors.
#[derive(Debug, Error)]
pub enum RimError {
    /// The code is not a 6-digit code on a whitelisted A-share board
    #[error("Invalid company identifier '{code}': {reason}")]
    InvalidIdentifier { code: String, reason: &'static str },

    /// A required fact could not be resolved for the company
    #[error("{fact} unavailable for {code}: {reason}")]
    DataUnavailable {
        code: CompanyCode,
        fact: MissingFact,
        reason: String,
    },

    /// A proposal violates its own invariants (internal defect)
    #[error("Malformed proposal for {code}: {reason}")]
    MalformedProposal { code: CompanyCode, reason: String },

    /// Rate/growth range configuration rejected before computing
    #[error("Invalid grid configuration: {0}")]
    InvalidConfig(String),
}

impl RimError {
    pub(crate) fn unavailable(code: &CompanyCode, fact: MissingFact, reason: impl fmt::Display) -> Self {
        Self::DataUnavailable {
            code: code.clone(),
            fact,
            reason: reason.to_string(),
        }
    }

    /// Whether the caller is at fault (bad code, bad ranges, missing data).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::MalformedProposal { .. })
    }
}

impl From<RimError> for aqi_common::Error {
    fn from(err: RimError) -> Self {
        let message = err.to_string();
        match err {
            RimError::InvalidIdentifier { .. } | RimError::InvalidConfig(_) => {
                Self::InvalidInput(message)
            }
            RimError::DataUnavailable { .. } => Self::NotFound(message),
            RimError::MalformedProposal { .. } => Self::Internal(message),
        }
    }
}
