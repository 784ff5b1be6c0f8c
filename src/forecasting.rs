//! Per-region sales forecasting and expansion-site scoring.
//!
//! Each region's monthly revenue is fitted with ordinary least squares
//! against calendar months since the first bucket, classified into a trend
//! and projected forward.

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::config::ForecastConfig;
use crate::geo::{grid_bin, CellKey, Coordinate};
use crate::models::{
    located_customers, located_service_points, CustomerLocation, MonthlyStat, ServicePoint,
    SuggestedLocation,
};

pub type ExpansionSuggestion = SuggestedLocation;

/// A forecasting unit: a service point's catchment, or a grid cell when no
/// service points exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Region {
    pub id: String,
    pub name: String,
    pub center: Option<Coordinate>,
    /// Set when the region is a service point's catchment.
    pub service_point_id: Option<String>,
    pub customer_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Growing,
    Stable,
    Declining,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyPrediction {
    pub year: i32,
    pub month: u32,
    pub predicted_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionForecast {
    pub region_id: String,
    pub region_name: String,
    pub current_sales: f64,
    pub forecast_sales: f64,
    /// Percent change from current sales to the last projected month.
    pub growth_rate: f64,
    pub trend: Trend,
    pub slope: f64,
    pub r_squared: f64,
    pub confidence: f64,
    pub data_points: usize,
    pub customer_count: usize,
    pub new_customer_potential: u32,
    pub monthly_predictions: Vec<MonthlyPrediction>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResult {
    pub horizon_months: usize,
    pub region_forecasts: Vec<RegionForecast>,
    pub expansion_suggestions: Vec<ExpansionSuggestion>,
    pub overall_growth: f64,
    pub confidence: f64,
}

/// Least-squares line through (index, value) points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Fit `values` against their 0-based index. `None` below two points.
pub fn fit_linear(values: &[f64]) -> Option<LinearFit> {
    let points: Vec<(f64, f64)> = values.iter().enumerate().map(|(i, &y)| (i as f64, y)).collect();
    fit_linear_points(&points)
}

/// Ordinary least squares over `(x, y)` pairs. `None` below two points.
///
/// R² is 0 when the series has no variance. A zero-width x range fits a
/// flat line through the mean.
pub fn fit_linear_points(points: &[(f64, f64)]) -> Option<LinearFit> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;
    let x_mean = points.iter().map(|(x, _)| x).sum::<f64>() / nf;
    let y_mean = points.iter().map(|(_, y)| y).sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for &(x, y) in points {
        let dx = x - x_mean;
        sxx += dx * dx;
        sxy += dx * (y - y_mean);
    }
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    let intercept = y_mean - slope * x_mean;

    let mut ss_tot = 0.0;
    let mut ss_res = 0.0;
    for &(x, y) in points {
        let predicted = intercept + slope * x;
        ss_tot += (y - y_mean).powi(2);
        ss_res += (y - predicted).powi(2);
    }
    let r_squared = if ss_tot > 0.0 {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

/// Trend relative to the series' own mean, so small and large regions are
/// judged on the same scale.
pub fn classify_trend(slope: f64, mean: f64, threshold_ratio: f64) -> Trend {
    let threshold = mean.abs() * threshold_ratio;
    if slope > threshold {
        Trend::Growing
    } else if slope < -threshold {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Calendar months from `from` to `to`.
fn months_between(from: (i32, u32), to: (i32, u32)) -> i64 {
    (to.0 as i64 - from.0 as i64) * 12 + (to.1 as i64 - from.1 as i64)
}

fn current_month() -> (i32, u32) {
    let now = Utc::now();
    (now.year(), now.month())
}

fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month >= 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

pub struct ForecastEngine {
    config: ForecastConfig,
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    /// One region per service point; located customers join the region of
    /// their unit id, or else the nearest located service point. Without any
    /// service points, regions are grid cells of located customers.
    pub fn build_regions(&self, customers: &[CustomerLocation], service_points: &[ServicePoint]) -> Vec<Region> {
        let located = located_customers(customers);
        let anchors = located_service_points(service_points);

        if service_points.is_empty() {
            let mut cells: BTreeMap<CellKey, Vec<(&CustomerLocation, Coordinate)>> = BTreeMap::new();
            for &(customer, coordinate) in &located {
                let key = grid_bin(coordinate.lat, coordinate.lng, self.config.region_cell_degrees);
                cells.entry(key).or_default().push((customer, coordinate));
            }
            return cells
                .into_iter()
                .map(|(key, members)| {
                    let n = members.len() as f64;
                    let center = Coordinate {
                        lat: members.iter().map(|(_, c)| c.lat).sum::<f64>() / n,
                        lng: members.iter().map(|(_, c)| c.lng).sum::<f64>() / n,
                    };
                    Region {
                        id: format!("cell:{}:{}", key.row, key.col),
                        name: format!("Area {:.2}, {:.2}", center.lat, center.lng),
                        center: Some(center),
                        service_point_id: None,
                        customer_ids: members.iter().map(|(c, _)| c.id.clone()).collect(),
                    }
                })
                .collect();
        }

        let mut regions: Vec<Region> = service_points
            .iter()
            .map(|sp| Region {
                id: sp.id.clone(),
                name: sp.name.clone(),
                center: sp.coordinate,
                service_point_id: Some(sp.id.clone()),
                customer_ids: BTreeSet::new(),
            })
            .collect();
        let by_id: HashMap<&str, usize> = service_points
            .iter()
            .enumerate()
            .map(|(i, sp)| (sp.id.as_str(), i))
            .collect();

        for &(customer, coordinate) in &located {
            let explicit = customer.unit_id.as_deref().and_then(|unit| by_id.get(unit).copied());
            let region = explicit.or_else(|| {
                anchors
                    .iter()
                    .map(|(sp, c)| (by_id[sp.id.as_str()], c.distance_to(&coordinate)))
                    .min_by(|a, b| a.1.total_cmp(&b.1))
                    .map(|(idx, _)| idx)
            });
            if let Some(idx) = region {
                regions[idx].customer_ids.insert(customer.id.clone());
            }
        }
        regions
    }

    /// Forecast `horizon_months` ahead for every region and score expansion
    /// sites.
    pub fn forecast(
        &self,
        regions: &[Region],
        stats: &[MonthlyStat],
        customers: &[CustomerLocation],
        service_points: &[ServicePoint],
        horizon_months: usize,
    ) -> ForecastResult {
        let profits: HashMap<&str, f64> = located_customers(customers)
            .into_iter()
            .map(|(c, _)| (c.id.as_str(), c.monthly_profit))
            .collect();

        // Regions without history are dated from the latest month any region
        // has, or from the current month when there are no stats at all.
        let anchor = stats
            .iter()
            .filter(|s| (1..=12).contains(&s.month))
            .map(|s| (s.year, s.month))
            .max()
            .unwrap_or_else(current_month);

        let mut valid_fits = 0usize;
        let region_forecasts: Vec<RegionForecast> = regions
            .iter()
            .map(|region| {
                let series = self.region_series(region, stats);
                let fallback: f64 = region
                    .customer_ids
                    .iter()
                    .filter_map(|id| profits.get(id.as_str()))
                    .sum();
                let forecast = self.forecast_region(region, &series, fallback, anchor, horizon_months);
                if forecast.data_points >= 2 {
                    valid_fits += 1;
                }
                forecast
            })
            .collect();

        let overall_growth = if region_forecasts.is_empty() {
            0.0
        } else {
            region_forecasts.iter().map(|f| f.growth_rate).sum::<f64>() / region_forecasts.len() as f64
        };
        let confidence = if region_forecasts.is_empty() {
            0.0
        } else {
            (0.5 + 0.05 * valid_fits as f64).min(self.config.max_confidence)
        };

        let expansion_suggestions = self.expansion_candidates(customers, service_points);

        debug!(
            regions = region_forecasts.len(),
            valid_fits,
            suggestions = expansion_suggestions.len(),
            "forecast finished"
        );

        ForecastResult {
            horizon_months,
            region_forecasts,
            expansion_suggestions,
            overall_growth,
            confidence,
        }
    }

    /// Chronological monthly revenue for a region.
    fn region_series(&self, region: &Region, stats: &[MonthlyStat]) -> Vec<((i32, u32), f64)> {
        let mut buckets: BTreeMap<(i32, u32), f64> = BTreeMap::new();
        for stat in stats {
            if !(1..=12).contains(&stat.month) {
                continue;
            }
            let matches = match (&stat.service_point_id, &region.service_point_id) {
                (Some(stat_sp), Some(region_sp)) => stat_sp == region_sp,
                (Some(_), None) => false,
                (None, _) => stat
                    .customer_id
                    .as_ref()
                    .is_some_and(|id| region.customer_ids.contains(id)),
            };
            if matches {
                *buckets.entry((stat.year, stat.month)).or_insert(0.0) += stat.amount;
            }
        }
        buckets.into_iter().collect()
    }

    fn forecast_region(
        &self,
        region: &Region,
        series: &[((i32, u32), f64)],
        fallback: f64,
        anchor: (i32, u32),
        horizon_months: usize,
    ) -> RegionForecast {
        let cfg = &self.config;
        let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();
        let current_sales = values.last().copied().unwrap_or(fallback);
        let (mut year, mut month) = series.last().map(|(ym, _)| *ym).unwrap_or(anchor);

        // x is calendar months since the first bucket, so gaps keep their width.
        let first = series.first().map(|(ym, _)| *ym).unwrap_or(anchor);
        let points: Vec<(f64, f64)> = series
            .iter()
            .map(|(ym, v)| (months_between(first, *ym) as f64, *v))
            .collect();
        let last_x = points.last().map(|(x, _)| *x).unwrap_or(0.0);

        let fit = fit_linear_points(&points);
        let (slope, r_squared, trend, confidence) = match &fit {
            Some(fit) => {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                let points_factor = values.len().min(12) as f64 / 12.0;
                let confidence = (cfg.min_confidence + 0.25 * fit.r_squared + 0.1 * points_factor)
                    .clamp(cfg.min_confidence, cfg.max_confidence);
                (
                    fit.slope,
                    fit.r_squared,
                    classify_trend(fit.slope, mean, cfg.trend_threshold_ratio),
                    confidence,
                )
            }
            None => (0.0, 0.0, Trend::Stable, cfg.insufficient_data_confidence),
        };

        let mut monthly_predictions = Vec::with_capacity(horizon_months);
        for step in 0..horizon_months {
            (year, month) = next_month(year, month);
            let predicted_sales = match &fit {
                Some(fit) => fit.predict(last_x + 1.0 + step as f64).max(0.0),
                None => current_sales.max(0.0),
            };
            monthly_predictions.push(MonthlyPrediction {
                year,
                month,
                predicted_sales,
            });
        }

        let forecast_sales = monthly_predictions
            .last()
            .map(|p| p.predicted_sales)
            .unwrap_or(current_sales);
        let growth_rate = if current_sales > 0.0 {
            (forecast_sales - current_sales) / current_sales * 100.0
        } else {
            0.0
        };
        let customer_count = region.customer_ids.len();
        let new_customer_potential = (customer_count as f64 * growth_rate.max(0.0) / 100.0).round() as u32;

        RegionForecast {
            region_id: region.id.clone(),
            region_name: region.name.clone(),
            current_sales,
            forecast_sales,
            growth_rate,
            trend,
            slope,
            r_squared,
            confidence,
            data_points: values.len(),
            customer_count,
            new_customer_potential,
            monthly_predictions,
        }
    }

    /// Dense customer cells that sit far from every service point.
    fn expansion_candidates(
        &self,
        customers: &[CustomerLocation],
        service_points: &[ServicePoint],
    ) -> Vec<ExpansionSuggestion> {
        let cfg = &self.config;
        let anchors = located_service_points(service_points);

        let mut cells: BTreeMap<CellKey, Vec<(&CustomerLocation, Coordinate)>> = BTreeMap::new();
        for (customer, coordinate) in located_customers(customers) {
            let key = grid_bin(coordinate.lat, coordinate.lng, cfg.expansion_cell_degrees);
            cells.entry(key).or_default().push((customer, coordinate));
        }

        let mut suggestions: Vec<ExpansionSuggestion> = cells
            .values()
            .filter(|members| members.len() >= cfg.expansion_min_customers)
            .filter_map(|members| {
                let n = members.len() as f64;
                let centroid = Coordinate {
                    lat: members.iter().map(|(_, c)| c.lat).sum::<f64>() / n,
                    lng: members.iter().map(|(_, c)| c.lng).sum::<f64>() / n,
                };
                let nearest = anchors
                    .iter()
                    .map(|(_, c)| c.distance_to(&centroid))
                    .min_by(f64::total_cmp);
                if nearest.is_some_and(|d| d <= cfg.expansion_min_distance_km) {
                    return None;
                }
                let distance = nearest
                    .unwrap_or(cfg.expansion_distance_cap_km)
                    .min(cfg.expansion_distance_cap_km);
                let revenue: f64 = members.iter().map(|(c, _)| c.monthly_profit).sum();
                let score = n * (revenue.max(0.0) / 1_000_000.0) * distance;

                let reasoning = match nearest {
                    Some(d) => format!(
                        "{} customers generating {:.0} per month are {:.1} km from the nearest service point",
                        members.len(),
                        revenue,
                        d
                    ),
                    None => format!(
                        "{} customers generating {:.0} per month have no service point at all",
                        members.len(),
                        revenue
                    ),
                };

                Some(SuggestedLocation {
                    coordinate: centroid,
                    score,
                    estimated_customers: members.len(),
                    estimated_revenue: revenue * 12.0,
                    nearest_service_km: nearest,
                    reasoning,
                })
            })
            .collect();

        suggestions.sort_by(|a, b| b.score.total_cmp(&a.score));
        suggestions.truncate(cfg.expansion_top_n);
        suggestions
    }
}
