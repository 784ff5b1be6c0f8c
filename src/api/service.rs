//! Shared business logic for the REST host
//!
//! Collaborator data is re-read on every request; nothing is cached between
//! calls. Engines run on tokio's blocking pool under a wall-clock bound.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analytics::{AnalysisParams, DashboardAnalysis, Dataset, GeoAnalytics};
use crate::clustering::ClusterResult;
use crate::config::EngineConfig;
use crate::coverage::RadiusAnalysisResult;
use crate::forecasting::ForecastResult;
use crate::loader;
use crate::models::located_customers;

/// Where request data comes from.
#[derive(Debug, Clone)]
pub enum DataSource {
    /// A directory of collaborator CSV exports, read per request.
    Directory(PathBuf),
    /// A fixed in-memory dataset.
    Static(Arc<Dataset>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetStats {
    pub total_customers: usize,
    pub located_customers: usize,
    pub service_points: usize,
    pub monthly_stat_rows: usize,
}

pub struct AnalyticsService {
    source: DataSource,
    analytics: GeoAnalytics,
}

impl AnalyticsService {
    pub fn new(source: DataSource, config: EngineConfig) -> Self {
        Self {
            source,
            analytics: GeoAnalytics::new(config),
        }
    }

    pub async fn load_dataset(&self) -> Result<Arc<Dataset>> {
        match &self.source {
            DataSource::Static(dataset) => Ok(Arc::clone(dataset)),
            DataSource::Directory(dir) => {
                let dir = dir.clone();
                let default_radius = self.analytics.config().coverage.default_radius_km;
                let dataset = tokio::task::spawn_blocking(move || loader::load_dataset(&dir, default_radius))
                    .await??;
                Ok(Arc::new(dataset))
            }
        }
    }

    pub async fn get_stats(&self) -> Result<DatasetStats> {
        let dataset = self.load_dataset().await?;
        Ok(DatasetStats {
            total_customers: dataset.customers.len(),
            located_customers: located_customers(&dataset.customers).len(),
            service_points: dataset.service_points.len(),
            monthly_stat_rows: dataset.monthly_stats.len(),
        })
    }

    pub async fn get_clusters(&self, k: usize) -> Result<ClusterResult> {
        let dataset = self.load_dataset().await?;
        self.run_engine("clustering", dataset, move |a, d| a.clusters(d, k)).await
    }

    pub async fn get_forecast(&self, horizon_months: usize) -> Result<ForecastResult> {
        let dataset = self.load_dataset().await?;
        self.run_engine("forecasting", dataset, move |a, d| a.forecast(d, horizon_months))
            .await
    }

    pub async fn get_coverage(&self, radius_km: Option<f64>) -> Result<RadiusAnalysisResult> {
        let dataset = self.load_dataset().await?;
        self.run_engine("coverage", dataset, move |a, d| a.coverage(d, radius_km))
            .await
    }

    /// Run the three engines concurrently. A failed or timed-out engine
    /// leaves its slot empty; the others are still returned.
    pub async fn get_dashboard(&self, params: AnalysisParams) -> Result<DashboardAnalysis> {
        let dataset = self.load_dataset().await?;

        let (clusters, forecast, coverage) = tokio::join!(
            self.run_engine("clustering", Arc::clone(&dataset), move |a, d| a.clusters(d, params.k)),
            self.run_engine("forecasting", Arc::clone(&dataset), move |a, d| {
                a.forecast(d, params.horizon_months)
            }),
            self.run_engine("coverage", Arc::clone(&dataset), move |a, d| {
                a.coverage(d, params.radius_km)
            }),
        );

        let mut errors = Vec::new();
        let clusters = clusters.map_err(|e| errors.push(e.to_string())).ok();
        let forecast = forecast.map_err(|e| errors.push(e.to_string())).ok();
        let coverage = coverage.map_err(|e| errors.push(e.to_string())).ok();

        info!(
            k = params.k,
            horizon = params.horizon_months,
            radius = ?params.radius_km,
            failed = errors.len(),
            "dashboard request served"
        );

        Ok(DashboardAnalysis {
            clusters,
            forecast,
            coverage,
            errors,
        })
    }

    async fn run_engine<T, F>(&self, name: &'static str, dataset: Arc<Dataset>, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&GeoAnalytics, &Dataset) -> T + Send + 'static,
    {
        let analytics = self.analytics.clone();
        let timeout = analytics.config().engine_timeout();
        let task = tokio::task::spawn_blocking(move || job(&analytics, &dataset));

        // A timed-out task keeps running on the blocking pool; its result is
        // dropped when it finishes.
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                warn!("{} engine failed: {}", name, e);
                Err(anyhow!("{} engine failed: {}", name, e))
            }
            Err(_) => {
                warn!("{} engine timed out after {:?}", name, timeout);
                Err(anyhow!("{} engine timed out after {:?}", name, timeout))
            }
        }
    }
}
