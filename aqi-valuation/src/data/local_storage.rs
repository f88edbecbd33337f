//! Local accounting data storage using SQLite.
//!
//! Holds the data snapshot the valuation engine reads:
//! - Per-period indicators (book value per share, EPS)
//! - Analyst EPS forecast snapshots
//! - Industry membership and industry ROE benchmarks
//!
//! The store implements all three lookup traits, so a single instance can
//! back the proposal builder.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::provider::{ForecastSource, IndicatorSource, IndustrySource, ProviderError};
use super::{EpsForecast, Indicator, IndustryRoe};
use crate::valuation::CompanyCode;

// ============================================================================
// Database Schema
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
-- Per-period fundamentals
CREATE TABLE IF NOT EXISTS indicators (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    period TEXT NOT NULL,
    bps REAL,
    eps REAL,
    source TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(code, period)
);

CREATE INDEX IF NOT EXISTS idx_indicators_period
ON indicators(period);

-- Analyst EPS forecast snapshots
CREATE TABLE IF NOT EXISTS eps_forecasts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    as_of TEXT NOT NULL,
    eps_y1 REAL,
    eps_y2 REAL,
    eps_y3 REAL,
    source TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(code, as_of)
);

CREATE INDEX IF NOT EXISTS idx_eps_forecasts_as_of
ON eps_forecasts(as_of);

-- Company to industry classification
CREATE TABLE IF NOT EXISTS industry_members (
    code TEXT PRIMARY KEY,
    industry_code TEXT NOT NULL,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);

-- Industry benchmarks
CREATE TABLE IF NOT EXISTS industries (
    industry_code TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    roe REAL NOT NULL,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP
);
"#;

// ============================================================================
// Local Storage
// ============================================================================

/// Local SQLite storage for the accounting data snapshot
pub struct LocalStorage {
    /// rusqlite::Connection is Send but not Sync, so it lives behind a Mutex
    db: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl LocalStorage {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path).context("Failed to open local storage database")?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create database tables")?;

        info!(db_path = %db_path.display(), "Initialized local storage");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Get the database path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ========================================================================
    // Indicator Operations
    // ========================================================================

    /// Upsert indicators for a fiscal period
    pub async fn save_indicators(
        &self,
        period: &str,
        rows: &[(CompanyCode, Indicator)],
        source: &str,
    ) -> Result<usize> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO indicators (code, period, bps, eps, source)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(code, period) DO UPDATE SET
                    bps = excluded.bps, eps = excluded.eps, source = excluded.source",
            )?;

            for (code, indicator) in rows {
                count += stmt.execute(params![
                    code.as_str(),
                    period,
                    indicator.book_value_per_share,
                    indicator.earnings_per_share,
                    source,
                ])?;
            }
        }

        tx.commit()?;
        debug!(period, count, "Saved indicators");
        Ok(count)
    }

    // ========================================================================
    // Forecast Operations
    // ========================================================================

    /// Upsert an EPS forecast snapshot
    pub async fn save_eps_forecasts(
        &self,
        as_of: NaiveDate,
        rows: &[(CompanyCode, EpsForecast)],
        source: &str,
    ) -> Result<usize> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let as_of = as_of.to_string();
        let mut count = 0;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO eps_forecasts (code, as_of, eps_y1, eps_y2, eps_y3, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(code, as_of) DO UPDATE SET
                    eps_y1 = excluded.eps_y1, eps_y2 = excluded.eps_y2,
                    eps_y3 = excluded.eps_y3, source = excluded.source",
            )?;

            for (code, forecast) in rows {
                count += stmt.execute(params![
                    code.as_str(),
                    as_of,
                    forecast.eps_y1,
                    forecast.eps_y2,
                    forecast.eps_y3,
                    source,
                ])?;
            }
        }

        tx.commit()?;
        debug!(as_of = %as_of, count, "Saved EPS forecasts");
        Ok(count)
    }

    // ========================================================================
    // Industry Operations
    // ========================================================================

    /// Upsert an industry benchmark
    pub async fn save_industry(&self, industry: &IndustryRoe) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO industries (industry_code, name, roe) VALUES (?1, ?2, ?3)
             ON CONFLICT(industry_code) DO UPDATE SET
                name = excluded.name, roe = excluded.roe, updated_at = CURRENT_TIMESTAMP",
            params![industry.industry_code, industry.industry_name, industry.roe],
        )?;
        Ok(())
    }

    /// Assign a company to an industry
    pub async fn save_industry_member(&self, code: &CompanyCode, industry_code: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO industry_members (code, industry_code) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET
                industry_code = excluded.industry_code, updated_at = CURRENT_TIMESTAMP",
            params![code.as_str(), industry_code],
        )?;
        Ok(())
    }

    // ========================================================================
    // Row Mapping
    // ========================================================================

    fn row_to_indicator(row: &rusqlite::Row) -> rusqlite::Result<Indicator> {
        Ok(Indicator {
            book_value_per_share: row.get::<_, Option<f64>>("bps")?.filter(|v| v.is_finite()),
            earnings_per_share: row.get::<_, Option<f64>>("eps")?.filter(|v| v.is_finite()),
        })
    }

    fn row_to_forecast(row: &rusqlite::Row) -> rusqlite::Result<EpsForecast> {
        let column = |name: &str| -> rusqlite::Result<Option<f64>> {
            Ok(row.get::<_, Option<f64>>(name)?.filter(|v| v.is_finite()))
        };

        Ok(EpsForecast {
            eps_y1: column("eps_y1")?,
            eps_y2: column("eps_y2")?,
            eps_y3: column("eps_y3")?,
        })
    }

    /// Key rows by company code, skipping codes that are not valid A-share codes.
    fn collect_by_code<T>(
        rows: impl Iterator<Item = rusqlite::Result<(String, T)>>,
    ) -> Result<HashMap<CompanyCode, T>, ProviderError> {
        let mut map = HashMap::new();
        for row in rows {
            let (raw_code, value) = row?;
            match raw_code.parse::<CompanyCode>() {
                Ok(code) => {
                    map.insert(code, value);
                }
                Err(e) => warn!(code = %raw_code, error = %e, "Skipping row with invalid code"),
            }
        }
        Ok(map)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Get storage statistics
    pub async fn get_stats(&self) -> Result<LocalStorageStats> {
        let db = self.db.lock().await;
        let count = |table: &str| -> Result<u64> {
            let n: i64 = db.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
            Ok(n as u64)
        };

        Ok(LocalStorageStats {
            indicator_count: count("indicators")?,
            forecast_count: count("eps_forecasts")?,
            industry_member_count: count("industry_members")?,
            industry_count: count("industries")?,
        })
    }
}

// ============================================================================
// Lookup Trait Implementations
// ============================================================================

#[async_trait]
impl IndicatorSource for LocalStorage {
    async fn indicators(
        &self,
        period: &str,
    ) -> Result<HashMap<CompanyCode, Indicator>, ProviderError> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT code, bps, eps FROM indicators WHERE period = ?1")?;
        let rows = stmt.query_map(params![period], |row| {
            Ok((row.get::<_, String>("code")?, Self::row_to_indicator(row)?))
        })?;
        let map = Self::collect_by_code(rows)?;
        Ok(map)
    }

    async fn indicator(&self, period: &str, code: &CompanyCode) -> Result<Indicator, ProviderError> {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT bps, eps FROM indicators WHERE period = ?1 AND code = ?2",
            params![period, code.as_str()],
            Self::row_to_indicator,
        )
        .optional()?
        .ok_or_else(|| ProviderError::NotFound(format!("indicators of {} for {}", code, period)))
    }
}

#[async_trait]
impl ForecastSource for LocalStorage {
    async fn eps_forecasts(
        &self,
        as_of: NaiveDate,
    ) -> Result<HashMap<CompanyCode, EpsForecast>, ProviderError> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT code, eps_y1, eps_y2, eps_y3 FROM eps_forecasts WHERE as_of = ?1")?;
        let rows = stmt.query_map(params![as_of.to_string()], |row| {
            Ok((row.get::<_, String>("code")?, Self::row_to_forecast(row)?))
        })?;
        let map = Self::collect_by_code(rows)?;
        Ok(map)
    }

    async fn eps_forecast(
        &self,
        as_of: NaiveDate,
        code: &CompanyCode,
    ) -> Result<EpsForecast, ProviderError> {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT eps_y1, eps_y2, eps_y3 FROM eps_forecasts WHERE as_of = ?1 AND code = ?2",
            params![as_of.to_string(), code.as_str()],
            Self::row_to_forecast,
        )
        .optional()?
        .ok_or_else(|| ProviderError::NotFound(format!("EPS forecast of {} as of {}", code, as_of)))
    }
}

#[async_trait]
impl IndustrySource for LocalStorage {
    async fn industry_code(&self, code: &CompanyCode) -> Result<String, ProviderError> {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT industry_code FROM industry_members WHERE code = ?1",
            params![code.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| ProviderError::NotFound(format!("industry of {}", code)))
    }

    async fn industry_roe(&self, industry_code: &str) -> Result<IndustryRoe, ProviderError> {
        let db = self.db.lock().await;
        db.query_row(
            "SELECT industry_code, name, roe FROM industries WHERE industry_code = ?1",
            params![industry_code],
            |row| {
                Ok(IndustryRoe {
                    industry_code: row.get(0)?,
                    industry_name: row.get(1)?,
                    roe: row.get(2)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| ProviderError::NotFound(format!("industry {}", industry_code)))
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Row counts per table
#[derive(Debug, Clone, Default)]
pub struct LocalStorageStats {
    pub indicator_count: u64,
    pub forecast_count: u64,
    pub industry_member_count: u64,
    pub industry_count: u64,
}

impl std::fmt::Display for LocalStorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "indicators={}, forecasts={}, industry_members={}, industries={}",
            self.indicator_count, self.forecast_count, self.industry_member_count, self.industry_count
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
