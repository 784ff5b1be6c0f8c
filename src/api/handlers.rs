//! REST API handlers for the geo-analytics dashboard
//!
//! Query parameters are validated here; the engines assume they receive
//! sane values.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use super::service::{AnalyticsService, DatasetStats};
use crate::analytics::{AnalysisParams, DashboardAnalysis};
use crate::clustering::ClusterResult;
use crate::coverage::RadiusAnalysisResult;
use crate::forecasting::ForecastResult;

pub const DEFAULT_K: usize = 5;
pub const MAX_K: usize = 50;
pub const DEFAULT_HORIZON: usize = 6;
pub const MAX_HORIZON: usize = 60;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum ParamError {
    #[error("k must be between 1 and {max}, got {0}", max = MAX_K)]
    ClusterCount(usize),
    #[error("horizon must be between 1 and {max} months, got {0}", max = MAX_HORIZON)]
    Horizon(usize),
    #[error("radius must be a positive number of kilometres, got {0}")]
    Radius(f64),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn bad_request(e: ParamError) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: e.to_string() }))
}

fn internal(e: anyhow::Error) -> ApiError {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: format!("{:#}", e) }))
}

// ============================================================================
// Query Parameters
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ClusterQuery {
    pub k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ForecastQuery {
    pub horizon: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CoverageQuery {
    pub radius: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub k: Option<usize>,
    pub horizon: Option<usize>,
    pub radius: Option<f64>,
}

pub fn validate_k(k: Option<usize>) -> Result<usize, ParamError> {
    match k.unwrap_or(DEFAULT_K) {
        k @ 1..=MAX_K => Ok(k),
        k => Err(ParamError::ClusterCount(k)),
    }
}

pub fn validate_horizon(horizon: Option<usize>) -> Result<usize, ParamError> {
    match horizon.unwrap_or(DEFAULT_HORIZON) {
        h @ 1..=MAX_HORIZON => Ok(h),
        h => Err(ParamError::Horizon(h)),
    }
}

/// An absent radius means "each service point's own radius".
pub fn validate_radius(radius: Option<f64>) -> Result<Option<f64>, ParamError> {
    match radius {
        Some(r) if !(r.is_finite() && r > 0.0) => Err(ParamError::Radius(r)),
        other => Ok(other),
    }
}

impl DashboardQuery {
    pub fn into_params(self) -> Result<AnalysisParams, ParamError> {
        Ok(AnalysisParams {
            k: validate_k(self.k)?,
            horizon_months: validate_horizon(self.horizon)?,
            radius_km: validate_radius(self.radius)?,
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub type AppState = Arc<AnalyticsService>;

/// GET /api/v1/health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

/// GET /api/v1/stats
pub async fn get_stats(State(service): State<AppState>) -> Result<Json<DatasetStats>, ApiError> {
    service.get_stats().await.map(Json).map_err(internal)
}

/// GET /api/v1/clusters?k=N
pub async fn get_clusters(
    State(service): State<AppState>,
    Query(params): Query<ClusterQuery>,
) -> Result<Json<ClusterResult>, ApiError> {
    let k = validate_k(params.k).map_err(bad_request)?;
    service.get_clusters(k).await.map(Json).map_err(internal)
}

/// GET /api/v1/forecast?horizon=N
pub async fn get_forecast(
    State(service): State<AppState>,
    Query(params): Query<ForecastQuery>,
) -> Result<Json<ForecastResult>, ApiError> {
    let horizon = validate_horizon(params.horizon).map_err(bad_request)?;
    service.get_forecast(horizon).await.map(Json).map_err(internal)
}

/// GET /api/v1/coverage?radius=KM
pub async fn get_coverage(
    State(service): State<AppState>,
    Query(params): Query<CoverageQuery>,
) -> Result<Json<RadiusAnalysisResult>, ApiError> {
    let radius = validate_radius(params.radius).map_err(bad_request)?;
    service.get_coverage(radius).await.map(Json).map_err(internal)
}

/// GET /api/v1/dashboard?k=N&horizon=N&radius=KM
pub async fn get_dashboard(
    State(service): State<AppState>,
    Query(params): Query<DashboardQuery>,
) -> Result<Json<DashboardAnalysis>, ApiError> {
    let params = params.into_params().map_err(bad_request)?;
    service.get_dashboard(params).await.map(Json).map_err(internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_k() {
        assert_eq!(validate_k(None), Ok(DEFAULT_K));
        assert_eq!(validate_k(Some(1)), Ok(1));
        assert_eq!(validate_k(Some(0)), Err(ParamError::ClusterCount(0)));
        assert!(validate_k(Some(MAX_K + 1)).is_err());
    }

    #[test]
    fn test_validate_horizon() {
        assert_eq!(validate_horizon(Some(12)), Ok(12));
        assert_eq!(validate_horizon(Some(0)), Err(ParamError::Horizon(0)));
    }

    #[test]
    fn test_validate_radius() {
        assert_eq!(validate_radius(None), Ok(None));
        assert_eq!(validate_radius(Some(2.5)), Ok(Some(2.5)));
        assert!(validate_radius(Some(0.0)).is_err());
        assert!(validate_radius(Some(-1.0)).is_err());
        assert!(validate_radius(Some(f64::INFINITY)).is_err());
        assert!(validate_radius(Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_dashboard_query_into_params() {
        let query = DashboardQuery {
            k: Some(3),
            horizon: None,
            radius: Some(4.0),
        };
        let params = query.into_params().unwrap();
        assert_eq!(params.k, 3);
        assert_eq!(params.horizon_months, DEFAULT_HORIZON);
        assert_eq!(params.radius_km, Some(4.0));
    }
}
