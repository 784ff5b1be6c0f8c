//! Orchestrates one dashboard request: the three engines run independently
//! over the same dataset and their results are composed into one report.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clustering::{ClusterEngine, ClusterResult};
use crate::config::EngineConfig;
use crate::coverage::{CoverageEngine, RadiusAnalysisResult};
use crate::forecasting::{ForecastEngine, ForecastResult};
use crate::models::{CustomerLocation, MonthlyStat, ServicePoint};

/// Everything the collaborators supply for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub customers: Vec<CustomerLocation>,
    pub service_points: Vec<ServicePoint>,
    pub monthly_stats: Vec<MonthlyStat>,
}

/// Request parameters, validated by the host before they reach here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisParams {
    pub k: usize,
    pub horizon_months: usize,
    /// `None` uses each service point's own radius.
    pub radius_km: Option<f64>,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            k: 5,
            horizon_months: 6,
            radius_km: None,
        }
    }
}

/// Combined result. An engine that failed or timed out in the host leaves
/// its slot empty and records why in `errors`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAnalysis {
    pub clusters: Option<ClusterResult>,
    pub forecast: Option<ForecastResult>,
    pub coverage: Option<RadiusAnalysisResult>,
    pub errors: Vec<String>,
}

/// Stateless facade over the three engines.
#[derive(Debug, Clone, Default)]
pub struct GeoAnalytics {
    config: EngineConfig,
}

impl GeoAnalytics {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clusters(&self, dataset: &Dataset, k: usize) -> ClusterResult {
        ClusterEngine::new(self.config.clustering.clone()).cluster(
            &dataset.customers,
            &dataset.monthly_stats,
            k,
        )
    }

    pub fn forecast(&self, dataset: &Dataset, horizon_months: usize) -> ForecastResult {
        let engine = ForecastEngine::new(self.config.forecasting.clone());
        let regions = engine.build_regions(&dataset.customers, &dataset.service_points);
        engine.forecast(
            &regions,
            &dataset.monthly_stats,
            &dataset.customers,
            &dataset.service_points,
            horizon_months,
        )
    }

    pub fn coverage(&self, dataset: &Dataset, radius_km: Option<f64>) -> RadiusAnalysisResult {
        CoverageEngine::new(self.config.coverage.clone()).analyze_coverage(
            &dataset.customers,
            &dataset.service_points,
            radius_km,
        )
    }

    /// Run all three engines one after another.
    pub fn analyze(&self, dataset: &Dataset, params: &AnalysisParams) -> DashboardAnalysis {
        let clusters = self.clusters(dataset, params.k);
        let forecast = self.forecast(dataset, params.horizon_months);
        let coverage = self.coverage(dataset, params.radius_km);

        info!(
            customers = dataset.customers.len(),
            clusters = clusters.metrics.cluster_count,
            regions = forecast.region_forecasts.len(),
            coverage_pct = coverage.coverage_stats.coverage_percentage,
            "dashboard analysis complete"
        );

        DashboardAnalysis {
            clusters: Some(clusters),
            forecast: Some(forecast),
            coverage: Some(coverage),
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Coordinate;
    use crate::models::{CustomerStatus, ServicePointKind};

    fn dataset() -> Dataset {
        Dataset {
            customers: vec![
                CustomerLocation::new("a", Coordinate::new(38.08, 46.29), 100.0, "retail", CustomerStatus::Active),
                CustomerLocation::new("b", Coordinate::new(38.30, 46.60), 200.0, "food", CustomerStatus::Loss),
                CustomerLocation::new("c", None, 300.0, "food", CustomerStatus::Active),
            ],
            service_points: vec![ServicePoint::new(
                "b1",
                "Central",
                ServicePointKind::Branch,
                Coordinate::new(38.08, 46.29),
                5.0,
            )],
            monthly_stats: Vec::new(),
        }
    }

    #[test]
    fn test_engines_agree_on_located_customers() {
        let analysis = GeoAnalytics::default().analyze(&dataset(), &AnalysisParams::default());
        let clusters = analysis.clusters.unwrap();
        let coverage = analysis.coverage.unwrap();
        let forecast = analysis.forecast.unwrap();

        assert_eq!(clusters.assignments.len(), 2);
        assert_eq!(coverage.coverage_stats.total_customers, 2);
        let members: usize = forecast.region_forecasts.iter().map(|r| r.customer_count).sum();
        assert_eq!(members, 2);
        assert!(analysis.errors.is_empty());
    }

    #[test]
    fn test_analysis_serializes_camel_case() {
        let analysis = GeoAnalytics::default().analyze(&dataset(), &AnalysisParams::default());
        let json = serde_json::to_value(&analysis).unwrap();
        assert!(json["coverage"]["coverageStats"]["coveragePercentage"].is_number());
        assert!(json["clusters"]["metrics"]["silhouetteScore"].is_number());
        assert!(json["forecast"]["regionForecasts"].is_array());
    }
}
