//! Engine configuration.
//!
//! Every threshold the engines use is a fixed constant by default. A JSON
//! file can override any subset of them:
//!
//! ```json
//! {
//!   "clustering": { "highProfitThreshold": 4000000 },
//!   "coverage": { "defaultRadiusKm": 3.0 }
//! }
//! ```

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub clustering: ClusteringConfig,
    pub forecasting: ForecastConfig,
    pub coverage: CoverageConfig,
    /// Wall-clock bound per engine when the host runs a dashboard request.
    pub engine_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clustering: ClusteringConfig::default(),
            forecasting: ForecastConfig::default(),
            coverage: CoverageConfig::default(),
            engine_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClusteringConfig {
    pub max_iterations: usize,
    /// Silhouette is O(n²); larger inputs are evaluated on a strided sample.
    pub silhouette_sample_size: usize,
    pub high_profit_threshold: f64,
    pub high_active_ratio: f64,
    pub low_profit_threshold: f64,
    pub low_active_ratio: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            silhouette_sample_size: 2000,
            high_profit_threshold: 5_000_000.0,
            high_active_ratio: 0.6,
            low_profit_threshold: 1_000_000.0,
            low_active_ratio: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForecastConfig {
    /// Trend band as a fraction of the series mean.
    pub trend_threshold_ratio: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// Confidence reported when a region has fewer than two data points.
    pub insufficient_data_confidence: f64,
    /// Cell size for regions when no service points exist.
    pub region_cell_degrees: f64,
    pub expansion_cell_degrees: f64,
    pub expansion_min_customers: usize,
    pub expansion_min_distance_km: f64,
    pub expansion_distance_cap_km: f64,
    pub expansion_top_n: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            trend_threshold_ratio: 0.05,
            min_confidence: 0.6,
            max_confidence: 0.95,
            insufficient_data_confidence: 0.5,
            region_cell_degrees: 0.1,
            expansion_cell_degrees: 0.05,
            expansion_min_customers: 3,
            expansion_min_distance_km: 3.0,
            expansion_distance_cap_km: 50.0,
            expansion_top_n: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoverageConfig {
    /// Radius given to service points that arrive without one.
    pub default_radius_km: f64,
    pub gap_cell_degrees: f64,
    pub gap_min_customers: usize,
    pub suggestion_top_n: usize,
    /// Cell size of the spatial index used for radius membership.
    pub index_cell_degrees: f64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            default_radius_km: 5.0,
            gap_cell_degrees: 0.02,
            gap_min_customers: 2,
            suggestion_top_n: 5,
            index_cell_degrees: 0.05,
        }
    }
}

impl EngineConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: EngineConfig = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` when given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn engine_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.engine_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_override() {
        let config: EngineConfig = serde_json::from_str(
            r#"{ "clustering": { "highProfitThreshold": 4000000 }, "engineTimeoutMs": 500 }"#,
        )
        .unwrap();
        assert_eq!(config.clustering.high_profit_threshold, 4_000_000.0);
        assert_eq!(config.clustering.max_iterations, 100);
        assert_eq!(config.coverage, CoverageConfig::default());
        assert_eq!(config.engine_timeout_ms, 500);
    }

    #[test]
    fn test_load_without_path() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.forecasting.expansion_top_n, 5);
    }
}
