//! AQI Valuation Library
//!
//! Residual Income Model (RIM) valuation of A-share listed companies, served
//! over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                    aqi-valuation (Rust Service)                     │
//! │                              :8001                                  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  Data Snapshot  │─▶│  Proposal       │─▶│  Valuation      │     │
//! │  │  (SQLite)       │  │  Builder + LRU  │  │  Grid           │     │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Residual income
//! - Earnings in excess of a capital charge `r × opening book value`
//! - Book value rolls forward by clean surplus (no payout)
//!
//! ## Sensitivity grid
//! - Required return `r` and terminal growth `g` are uncertain inputs
//! - Every `(r, g)` pair with `r > g` gets its own intrinsic value

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod routes;
pub mod valuation;

pub use routes::build_router;

use anyhow::Result;
use aqi_common::config::Config;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::data::LocalStorage;
use crate::valuation::{ProposalBuilder, ProposalSettings, RimError, ValuationGridConfig};

/// Upper bound on a single request, including external data lookups
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Requests carry no body beyond query strings
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Valuation service state
pub struct ValuationState {
    /// Configuration
    pub config: Config,
    /// Proposal builder, owning the proposal cache
    pub builder: ProposalBuilder,
    /// Grid ranges used when a request omits them
    pub grid_defaults: ValuationGridConfig,
}

impl ValuationState {
    /// Create state backed by the SQLite data snapshot
    pub fn new(config: Config, store: Arc<LocalStorage>) -> Result<Self, RimError> {
        let builder = ProposalBuilder::from_store(store, ProposalSettings::from_config(&config));
        Self::with_builder(config, builder)
    }

    /// Create state around an existing builder
    pub fn with_builder(config: Config, builder: ProposalBuilder) -> Result<Self, RimError> {
        let grid_defaults = ValuationGridConfig::from_config(&config.valuation)?;
        Ok(Self {
            config,
            builder,
            grid_defaults,
        })
    }
}

/// Main valuation service
pub struct ValuationService {
    state: Arc<ValuationState>,
}

impl ValuationService {
    /// Create a new valuation service
    pub fn new(state: ValuationState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Start the HTTP server and run until shutdown
    pub async fn start(self) -> Result<()> {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        let app = build_router(self.state.clone())
            .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(cors);

        let addr: SocketAddr = self.state.config.bind_address().parse()?;
        tracing::info!(address = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        let stats = self.state.builder.cache().stats();
        tracing::info!(
            cached = stats.entries,
            hits = stats.hits,
            misses = stats.misses,
            "Valuation service stopped"
        );

        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
