//! Service coverage analysis.
//!
//! A customer is covered when it lies inside the radius of ANY service
//! point. That is not the same as being inside the radius of its nearest
//! service point once points carry different radii: a small kiosk next door
//! may not reach a customer that a large branch further away does.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::CoverageConfig;
use crate::geo::{grid_bin, CellKey, Coordinate, SpatialGrid};
use crate::models::{
    located_customers, located_service_points, CustomerLocation, CustomerStatus, ServicePoint,
    ServicePointKind, SuggestedLocation,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePointCoverage {
    pub id: String,
    pub name: String,
    pub kind: ServicePointKind,
    pub coordinate: Option<Coordinate>,
    pub radius_km: f64,
    pub customer_count: usize,
    pub total_revenue: f64,
    /// Share of all located customers inside this point's radius, in percent.
    pub coverage_efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearestServicePoint {
    pub id: String,
    pub name: String,
    pub distance_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UncoveredCustomer {
    pub customer_id: String,
    pub coordinate: Coordinate,
    pub monthly_profit: f64,
    pub business_type: String,
    pub status: CustomerStatus,
    pub nearest_service_point: Option<NearestServicePoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageStats {
    pub total_customers: usize,
    pub covered_customers: usize,
    pub uncovered_customers: usize,
    pub coverage_percentage: f64,
    pub average_distance_km: f64,
    pub max_distance_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RadiusAnalysisResult {
    pub service_points: Vec<ServicePointCoverage>,
    pub uncovered_customers: Vec<UncoveredCustomer>,
    pub coverage_stats: CoverageStats,
    pub suggested_locations: Vec<SuggestedLocation>,
}

pub struct CoverageEngine {
    config: CoverageConfig,
}

impl CoverageEngine {
    pub fn new(config: CoverageConfig) -> Self {
        Self { config }
    }

    /// `radius_km` applies one radius to every service point; `None` uses
    /// each point's own coverage radius.
    pub fn analyze_coverage(
        &self,
        customers: &[CustomerLocation],
        service_points: &[ServicePoint],
        radius_km: Option<f64>,
    ) -> RadiusAnalysisResult {
        let located = located_customers(customers);
        let coordinates: Vec<Coordinate> = located.iter().map(|(_, c)| *c).collect();
        let total = located.len();
        let grid = SpatialGrid::from_coordinates(self.config.index_cell_degrees, &coordinates);

        let mut covered = vec![false; total];
        let point_coverage: Vec<ServicePointCoverage> = service_points
            .iter()
            .map(|sp| {
                let radius = radius_km.unwrap_or(sp.coverage_radius_km);
                let members = match &sp.coordinate {
                    Some(center) => grid.within_radius(&coordinates, center, radius),
                    None => Vec::new(),
                };
                for &idx in &members {
                    covered[idx] = true;
                }
                let total_revenue: f64 = members.iter().map(|&i| located[i].0.monthly_profit).sum();
                ServicePointCoverage {
                    id: sp.id.clone(),
                    name: sp.name.clone(),
                    kind: sp.kind,
                    coordinate: sp.coordinate,
                    radius_km: radius,
                    customer_count: members.len(),
                    total_revenue,
                    coverage_efficiency: percentage(members.len(), total),
                }
            })
            .collect();

        let anchors = located_service_points(service_points);
        let mut distance_sum = 0.0;
        let mut distance_count = 0usize;
        let mut max_distance_km: f64 = 0.0;
        let mut uncovered_customers = Vec::new();

        for (idx, (customer, coordinate)) in located.iter().enumerate() {
            let nearest = nearest_service_point(&anchors, coordinate);
            if let Some(found) = &nearest {
                distance_sum += found.distance_km;
                distance_count += 1;
                max_distance_km = max_distance_km.max(found.distance_km);
            }
            if !covered[idx] {
                uncovered_customers.push(UncoveredCustomer {
                    customer_id: customer.id.clone(),
                    coordinate: *coordinate,
                    monthly_profit: customer.monthly_profit,
                    business_type: customer.business_type.clone(),
                    status: customer.status,
                    nearest_service_point: nearest,
                });
            }
        }

        let covered_customers = covered.iter().filter(|&&c| c).count();
        let coverage_stats = CoverageStats {
            total_customers: total,
            covered_customers,
            uncovered_customers: total - covered_customers,
            coverage_percentage: percentage(covered_customers, total),
            average_distance_km: if distance_count > 0 {
                distance_sum / distance_count as f64
            } else {
                0.0
            },
            max_distance_km,
        };

        let suggested_locations = self.suggest_locations(&uncovered_customers, &anchors);

        debug!(
            customers = total,
            service_points = service_points.len(),
            covered = covered_customers,
            suggestions = suggested_locations.len(),
            "coverage analysis finished"
        );

        RadiusAnalysisResult {
            service_points: point_coverage,
            uncovered_customers,
            coverage_stats,
            suggested_locations,
        }
    }

    /// Bin uncovered customers into small cells; crowded cells become
    /// candidate sites.
    fn suggest_locations(
        &self,
        uncovered: &[UncoveredCustomer],
        anchors: &[(&ServicePoint, Coordinate)],
    ) -> Vec<SuggestedLocation> {
        let cfg = &self.config;
        let mut cells: BTreeMap<CellKey, Vec<&UncoveredCustomer>> = BTreeMap::new();
        for customer in uncovered {
            let key = grid_bin(customer.coordinate.lat, customer.coordinate.lng, cfg.gap_cell_degrees);
            cells.entry(key).or_default().push(customer);
        }

        let mut suggestions: Vec<SuggestedLocation> = cells
            .values()
            .filter(|members| members.len() >= cfg.gap_min_customers)
            .map(|members| {
                let n = members.len() as f64;
                let centroid = Coordinate {
                    lat: members.iter().map(|c| c.coordinate.lat).sum::<f64>() / n,
                    lng: members.iter().map(|c| c.coordinate.lng).sum::<f64>() / n,
                };
                let annual_revenue = members.iter().map(|c| c.monthly_profit).sum::<f64>() * 12.0;
                let nearest_service_km = nearest_service_point(anchors, &centroid).map(|found| found.distance_km);
                let reasoning = match nearest_service_km {
                    Some(d) => format!(
                        "{} uncovered customers worth {:.0} per year; nearest service point is {:.1} km away",
                        members.len(),
                        annual_revenue,
                        d
                    ),
                    None => format!(
                        "{} uncovered customers worth {:.0} per year with no service point available",
                        members.len(),
                        annual_revenue
                    ),
                };
                SuggestedLocation {
                    coordinate: centroid,
                    score: n * annual_revenue.max(0.0),
                    estimated_customers: members.len(),
                    estimated_revenue: annual_revenue,
                    nearest_service_km,
                    reasoning,
                }
            })
            .collect();

        suggestions.sort_by(|a, b| b.score.total_cmp(&a.score));
        suggestions.truncate(cfg.suggestion_top_n);
        suggestions
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Linear scan; ties keep the earlier service point.
fn nearest_service_point(
    anchors: &[(&ServicePoint, Coordinate)],
    coordinate: &Coordinate,
) -> Option<NearestServicePoint> {
    let mut best: Option<(&ServicePoint, f64)> = None;
    for (sp, center) in anchors {
        let distance = center.distance_to(coordinate);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((sp, distance));
        }
    }
    best.map(|(sp, distance_km)| NearestServicePoint {
        id: sp.id.clone(),
        name: sp.name.clone(),
        distance_km,
    })
}
