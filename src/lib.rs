//! Geo-analytics core for the POS monitoring dashboard.
//!
//! Three independent engines run over the same customer / service-point
//! dataset: customer clustering, per-region sales forecasting with expansion
//! suggestions, and service coverage analysis.

pub mod analytics;
pub mod api;
pub mod clustering;
pub mod config;
pub mod coverage;
pub mod forecasting;
pub mod geo;
pub mod loader;
pub mod models;

pub use analytics::{AnalysisParams, DashboardAnalysis, Dataset, GeoAnalytics};
pub use config::EngineConfig;
pub use geo::{haversine_distance, Coordinate};
