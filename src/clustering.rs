//! Deterministic k-means over customer locations.
//!
//! Feature construction is injected through [`FeatureExtractor`], so the
//! commercial profile (location, profit, transaction volume, category,
//! status) and the lighter location-plus-profit variant share one engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::ClusteringConfig;
use crate::geo::{normalize_features, Coordinate};
use crate::models::{located_customers, CustomerLocation, CustomerStatus, MonthlyStat};

// ============================================================================
// Feature extraction
// ============================================================================

/// Lookup tables a feature extractor may consult.
#[derive(Debug, Clone, Default)]
pub struct FeatureContext {
    /// customer id -> (total amount, total transaction count)
    aggregates: HashMap<String, (f64, u64)>,
    /// business type -> ordinal, assigned in first-seen order
    category_ordinals: HashMap<String, usize>,
}

impl FeatureContext {
    pub fn build(customers: &[(&CustomerLocation, Coordinate)], stats: &[MonthlyStat]) -> Self {
        let mut aggregates: HashMap<String, (f64, u64)> = HashMap::new();
        for stat in stats {
            if let Some(customer_id) = &stat.customer_id {
                let entry = aggregates.entry(customer_id.clone()).or_insert((0.0, 0));
                entry.0 += stat.amount;
                entry.1 += stat.transaction_count;
            }
        }

        let mut category_ordinals = HashMap::new();
        for (customer, _) in customers {
            let next = category_ordinals.len();
            category_ordinals.entry(customer.business_type.clone()).or_insert(next);
        }

        Self {
            aggregates,
            category_ordinals,
        }
    }

    pub fn aggregate(&self, customer_id: &str) -> (f64, u64) {
        self.aggregates.get(customer_id).copied().unwrap_or((0.0, 0))
    }

    pub fn category_ordinal(&self, business_type: &str) -> usize {
        self.category_ordinals.get(business_type).copied().unwrap_or(0)
    }
}

/// Strategy turning a located customer into a raw (unnormalized) feature row.
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(
        &self,
        customer: &CustomerLocation,
        coordinate: Coordinate,
        context: &FeatureContext,
    ) -> Vec<f64>;
}

/// [lat, lng, monthly profit, total amount, transaction count, category, status]
#[derive(Debug, Clone, Copy, Default)]
pub struct CommercialFeatures;

impl FeatureExtractor for CommercialFeatures {
    fn name(&self) -> &'static str {
        "commercial"
    }

    fn extract(
        &self,
        customer: &CustomerLocation,
        coordinate: Coordinate,
        context: &FeatureContext,
    ) -> Vec<f64> {
        let (amount, count) = context.aggregate(&customer.id);
        vec![
            coordinate.lat,
            coordinate.lng,
            customer.monthly_profit,
            amount,
            count as f64,
            context.category_ordinal(&customer.business_type) as f64,
            customer.status.ordinal(),
        ]
    }
}

/// [lat, lng, monthly profit]
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoProfitFeatures;

impl FeatureExtractor for GeoProfitFeatures {
    fn name(&self) -> &'static str {
        "geo-profit"
    }

    fn extract(
        &self,
        customer: &CustomerLocation,
        coordinate: Coordinate,
        _context: &FeatureContext,
    ) -> Vec<f64> {
        vec![coordinate.lat, coordinate.lng, customer.monthly_profit]
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PotentialTier {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: usize,
    /// Mean of member coordinates, for display.
    pub centroid: Coordinate,
    pub customer_count: usize,
    pub total_revenue: f64,
    pub average_profit: f64,
    pub dominant_business_type: String,
    pub active_ratio: f64,
    pub potential: PotentialTier,
    pub characteristics: Vec<String>,
    pub customer_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAssignment {
    pub customer_id: String,
    pub cluster_id: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetrics {
    pub cluster_count: usize,
    pub silhouette_score: f64,
    pub inertia: f64,
    pub high_potential_count: usize,
    pub low_potential_count: usize,
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResult {
    pub clusters: Vec<Cluster>,
    pub assignments: Vec<ClusterAssignment>,
    pub metrics: ClusterMetrics,
}

// ============================================================================
// K-means core
// ============================================================================

/// Outcome of k-means over normalized feature rows.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub iterations: usize,
    pub converged: bool,
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    squared_distance(a, b).sqrt()
}

/// Farthest-point seeding: the first row, then repeatedly the row whose
/// squared distance to its nearest chosen seed is largest. Ties resolve to
/// the lowest index, so identical input always yields identical seeds.
pub fn seed_centroids(points: &[Vec<f64>], k: usize) -> Vec<Vec<f64>> {
    let mut seeds: Vec<Vec<f64>> = Vec::with_capacity(k);
    let Some(first) = points.first() else {
        return seeds;
    };
    seeds.push(first.clone());

    let mut nearest: Vec<f64> = points.iter().map(|p| squared_distance(p, first)).collect();
    while seeds.len() < k {
        let mut best_idx = 0;
        let mut best_dist = 0.0;
        for (i, &d) in nearest.iter().enumerate() {
            if d > best_dist {
                best_dist = d;
                best_idx = i;
            }
        }
        let seed = points[best_idx].clone();
        for (i, p) in points.iter().enumerate() {
            nearest[i] = nearest[i].min(squared_distance(p, &seed));
        }
        seeds.push(seed);
    }
    seeds
}

fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best_cluster = 0;
    let mut best_dist = f64::INFINITY;
    for (j, centroid) in centroids.iter().enumerate() {
        let dist = squared_distance(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best_cluster = j;
        }
    }
    best_cluster
}

/// Lloyd iterations from deterministic seeds. Empty clusters keep their
/// previous centroid.
pub fn fit_kmeans(points: &[Vec<f64>], k: usize, max_iterations: usize) -> KMeansFit {
    let k = k.min(points.len());
    if k == 0 {
        return KMeansFit {
            labels: Vec::new(),
            centroids: Vec::new(),
            iterations: 0,
            converged: true,
        };
    }

    let max_iterations = max_iterations.max(1);
    let width = points[0].len();
    let mut centroids = seed_centroids(points, k);
    let mut labels = vec![usize::MAX; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;

        let mut changed = false;
        for (i, point) in points.iter().enumerate() {
            let cluster = nearest_centroid(point, &centroids);
            if labels[i] != cluster {
                labels[i] = cluster;
                changed = true;
            }
        }

        if !changed {
            converged = true;
            break;
        }

        let mut sums = vec![vec![0.0; width]; k];
        let mut counts = vec![0usize; k];
        for (point, &cluster) in points.iter().zip(labels.iter()) {
            for (sum, value) in sums[cluster].iter_mut().zip(point.iter()) {
                *sum += value;
            }
            counts[cluster] += 1;
        }
        for j in 0..k {
            if counts[j] > 0 {
                centroids[j] = sums[j].iter().map(|s| s / counts[j] as f64).collect();
            }
        }
    }

    KMeansFit {
        labels,
        centroids,
        iterations,
        converged,
    }
}

/// Sum of squared distances from each point to its assigned centroid.
pub fn compute_inertia(points: &[Vec<f64>], labels: &[usize], centroids: &[Vec<f64>]) -> f64 {
    points
        .iter()
        .zip(labels.iter())
        .filter(|(_, &label)| label < centroids.len())
        .map(|(point, &label)| squared_distance(point, &centroids[label]))
        .sum()
}

/// Mean silhouette coefficient, unfloored.
///
/// At most `sample_size` points are scored, taken at a fixed stride; each
/// scored point is compared against every point. Points in singleton
/// clusters, or with no other cluster to compare against, score 0.
pub fn silhouette_score(points: &[Vec<f64>], labels: &[usize], cluster_count: usize, sample_size: usize) -> f64 {
    let n = points.len();
    if n < 2 || cluster_count < 2 || sample_size == 0 {
        return 0.0;
    }

    let stride = n.div_ceil(sample_size).max(1);
    let mut total = 0.0;
    let mut scored = 0usize;

    for i in (0..n).step_by(stride) {
        let mut sums = vec![0.0; cluster_count];
        let mut counts = vec![0usize; cluster_count];
        for j in 0..n {
            if i == j {
                continue;
            }
            sums[labels[j]] += euclidean_distance(&points[i], &points[j]);
            counts[labels[j]] += 1;
        }

        let own = labels[i];
        let score = if counts[own] == 0 {
            0.0
        } else {
            let a = sums[own] / counts[own] as f64;
            let b = (0..cluster_count)
                .filter(|&c| c != own && counts[c] > 0)
                .map(|c| sums[c] / counts[c] as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if b.is_infinite() || denom == 0.0 {
                0.0
            } else {
                (b - a) / denom
            }
        };

        total += score;
        scored += 1;
    }

    if scored == 0 {
        0.0
    } else {
        total / scored as f64
    }
}

// ============================================================================
// Engine
// ============================================================================

pub struct ClusterEngine<F = CommercialFeatures> {
    config: ClusteringConfig,
    extractor: F,
}

impl ClusterEngine<CommercialFeatures> {
    pub fn new(config: ClusteringConfig) -> Self {
        Self {
            config,
            extractor: CommercialFeatures,
        }
    }
}

impl<F: FeatureExtractor> ClusterEngine<F> {
    pub fn with_extractor(config: ClusteringConfig, extractor: F) -> Self {
        Self { config, extractor }
    }

    /// Cluster the located customers into at most `k` groups.
    ///
    /// Never fails: fewer located customers than `k` lowers the effective
    /// cluster count, and no located customers yields an empty result.
    pub fn cluster(&self, customers: &[CustomerLocation], stats: &[MonthlyStat], k: usize) -> ClusterResult {
        let located = located_customers(customers);
        if located.is_empty() || k == 0 {
            return ClusterResult::default();
        }

        let context = FeatureContext::build(&located, stats);
        let raw: Vec<Vec<f64>> = located
            .iter()
            .map(|(customer, coordinate)| self.extractor.extract(customer, *coordinate, &context))
            .collect();
        let features = normalize_features(&raw);

        let fit = fit_kmeans(&features, k, self.config.max_iterations);
        debug!(
            extractor = self.extractor.name(),
            points = features.len(),
            k,
            iterations = fit.iterations,
            converged = fit.converged,
            "k-means finished"
        );

        // Renumber non-empty clusters densely, in seed order.
        let mut dense_ids = vec![None; fit.centroids.len()];
        let mut next_id = 0;
        let mut occupied = vec![false; fit.centroids.len()];
        for &label in &fit.labels {
            occupied[label] = true;
        }
        for (old, is_occupied) in occupied.iter().enumerate() {
            if *is_occupied {
                dense_ids[old] = Some(next_id);
                next_id += 1;
            }
        }
        let labels: Vec<usize> = fit
            .labels
            .iter()
            .map(|&label| dense_ids[label].unwrap_or(0))
            .collect();
        let centroids: Vec<Vec<f64>> = fit
            .centroids
            .iter()
            .zip(occupied.iter())
            .filter(|(_, &is_occupied)| is_occupied)
            .map(|(centroid, _)| centroid.clone())
            .collect();
        let cluster_count = centroids.len();

        let mut members: Vec<Vec<usize>> = vec![Vec::new(); cluster_count];
        for (idx, &label) in labels.iter().enumerate() {
            members[label].push(idx);
        }

        let clusters: Vec<Cluster> = members
            .iter()
            .enumerate()
            .map(|(id, idxs)| self.profile_cluster(id, idxs, &located, &context))
            .collect();

        let assignments = located
            .iter()
            .zip(labels.iter())
            .map(|((customer, _), &cluster_id)| ClusterAssignment {
                customer_id: customer.id.clone(),
                cluster_id,
            })
            .collect();

        let inertia = compute_inertia(&features, &labels, &centroids);
        let silhouette = silhouette_score(&features, &labels, cluster_count, self.config.silhouette_sample_size);

        let metrics = ClusterMetrics {
            cluster_count,
            silhouette_score: silhouette.max(0.0),
            inertia,
            high_potential_count: clusters.iter().filter(|c| c.potential == PotentialTier::High).count(),
            low_potential_count: clusters.iter().filter(|c| c.potential == PotentialTier::Low).count(),
            iterations: fit.iterations,
            converged: fit.converged,
        };

        ClusterResult {
            clusters,
            assignments,
            metrics,
        }
    }

    fn profile_cluster(
        &self,
        id: usize,
        idxs: &[usize],
        located: &[(&CustomerLocation, Coordinate)],
        context: &FeatureContext,
    ) -> Cluster {
        let count = idxs.len();
        let n = count as f64;

        let lat = idxs.iter().map(|&i| located[i].1.lat).sum::<f64>() / n;
        let lng = idxs.iter().map(|&i| located[i].1.lng).sum::<f64>() / n;
        let total_revenue: f64 = idxs.iter().map(|&i| located[i].0.monthly_profit).sum();
        let average_profit = total_revenue / n;
        let active = idxs
            .iter()
            .filter(|&&i| located[i].0.status == CustomerStatus::Active)
            .count();
        let active_ratio = active as f64 / n;

        // Mode; ties go to the category seen first in the input.
        let mut tally: HashMap<&str, usize> = HashMap::new();
        for &i in idxs {
            *tally.entry(located[i].0.business_type.as_str()).or_insert(0) += 1;
        }
        let dominant_business_type = tally
            .iter()
            .max_by(|a, b| {
                a.1.cmp(b.1)
                    .then_with(|| context.category_ordinal(b.0).cmp(&context.category_ordinal(a.0)))
            })
            .map(|(category, _)| category.to_string())
            .unwrap_or_default();

        let potential = self.classify(average_profit, active_ratio);

        let mut characteristics = vec![
            format!("{} customers, mostly {}", count, dominant_business_type),
            format!("Average monthly profit {:.0}", average_profit),
            format!("{:.0}% of devices active", active_ratio * 100.0),
        ];
        match potential {
            PotentialTier::High => characteristics.push("High-value, actively trading group".to_string()),
            PotentialTier::Low if active_ratio < self.config.low_active_ratio => {
                characteristics.push("Low activity: candidates for re-engagement".to_string())
            }
            PotentialTier::Low => characteristics.push("Low profitability".to_string()),
            PotentialTier::Medium => {}
        }

        Cluster {
            id,
            centroid: Coordinate { lat, lng },
            customer_count: count,
            total_revenue,
            average_profit,
            dominant_business_type,
            active_ratio,
            potential,
            characteristics,
            customer_ids: idxs.iter().map(|&i| located[i].0.id.clone()).collect(),
        }
    }

    fn classify(&self, average_profit: f64, active_ratio: f64) -> PotentialTier {
        let c = &self.config;
        if average_profit > c.high_profit_threshold && active_ratio > c.high_active_ratio {
            PotentialTier::High
        } else if average_profit < c.low_profit_threshold || active_ratio < c.low_active_ratio {
            PotentialTier::Low
        } else {
            PotentialTier::Medium
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(id: &str, lat: f64, lng: f64, profit: f64, status: CustomerStatus) -> CustomerLocation {
        CustomerLocation::new(id, Coordinate::new(lat, lng), profit, "retail", status)
    }

    #[test]
    fn test_seed_centroids_farthest_first() {
        let points = vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![1.0, 1.0], vec![0.9, 1.0]];
        let seeds = seed_centroids(&points, 2);
        assert_eq!(seeds, vec![vec![0.0, 0.0], vec![1.0, 1.0]]);
    }

    #[test]
    fn test_fit_kmeans_converges() {
        let points = vec![vec![0.0, 0.0], vec![0.1, 0.0], vec![1.0, 1.0], vec![0.9, 1.0]];
        let fit = fit_kmeans(&points, 2, 100);
        assert!(fit.converged);
        assert_eq!(fit.labels, vec![0, 0, 1, 1]);
        assert!((fit.centroids[0][0] - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_fit_kmeans_more_clusters_than_points() {
        let points = vec![vec![0.0], vec![1.0]];
        let fit = fit_kmeans(&points, 5, 100);
        assert_eq!(fit.centroids.len(), 2);
        assert_eq!(fit.labels, vec![0, 1]);
    }

    #[test]
    fn test_silhouette_bounds() {
        let points = vec![vec![0.0], vec![0.1], vec![1.0], vec![1.1]];
        let labels = vec![0, 0, 1, 1];
        let score = silhouette_score(&points, &labels, 2, 100);
        assert!(score > 0.8 && score <= 1.0);
        assert_eq!(silhouette_score(&points, &[0, 0, 0, 0], 1, 100), 0.0);
    }

    #[test]
    fn test_inertia_non_negative() {
        let points = vec![vec![0.0, 0.0], vec![1.0, 0.0]];
        let inertia = compute_inertia(&points, &[0, 0], &[vec![0.5, 0.0]]);
        assert!((inertia - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unlocated_customers_are_skipped() {
        let customers = vec![
            customer("a", 38.08, 46.29, 100.0, CustomerStatus::Active),
            CustomerLocation::new("b", None, 100.0, "retail", CustomerStatus::Active),
            customer("c", 38.20, 46.40, 100.0, CustomerStatus::Loss),
        ];
        let result = ClusterEngine::new(ClusteringConfig::default()).cluster(&customers, &[], 2);
        let ids: Vec<&str> = result.assignments.iter().map(|a| a.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn test_identical_points_collapse_to_one_cluster() {
        let customers: Vec<CustomerLocation> = (0..4)
            .map(|i| customer(&format!("c{}", i), 38.1, 46.3, 500.0, CustomerStatus::Normal))
            .collect();
        let result = ClusterEngine::new(ClusteringConfig::default()).cluster(&customers, &[], 3);
        assert_eq!(result.metrics.cluster_count, 1);
        assert_eq!(result.clusters[0].id, 0);
        assert_eq!(result.clusters[0].customer_count, 4);
        assert_eq!(result.metrics.silhouette_score, 0.0);
        assert!(result.assignments.iter().all(|a| a.cluster_id == 0));
    }

    #[test]
    fn test_empty_input() {
        let result = ClusterEngine::new(ClusteringConfig::default()).cluster(&[], &[], 3);
        assert!(result.clusters.is_empty());
        assert_eq!(result.metrics.cluster_count, 0);
    }

    #[test]
    fn test_geo_profit_extractor() {
        let customers = vec![
            customer("a", 38.08, 46.29, 6_000_000.0, CustomerStatus::Active),
            customer("b", 38.081, 46.291, 6_000_000.0, CustomerStatus::Active),
            customer("c", 38.20, 46.40, 100.0, CustomerStatus::Loss),
        ];
        let engine = ClusterEngine::with_extractor(ClusteringConfig::default(), GeoProfitFeatures);
        let result = engine.cluster(&customers, &[], 2);
        assert_eq!(result.metrics.cluster_count, 2);
        assert_eq!(result.clusters[0].customer_ids, vec!["a", "b"]);
        assert_eq!(result.clusters[1].customer_ids, vec!["c"]);
    }

    #[test]
    fn test_non_finite_profit_keeps_metrics_finite() {
        let mut customers: Vec<CustomerLocation> = (0..5)
            .map(|i| customer(&format!("c{}", i), 38.08 + i as f64 * 0.01, 46.29, 1000.0 * i as f64, CustomerStatus::Active))
            .collect();
        customers.push(customer("bad", 38.2, 46.4, f64::NAN, CustomerStatus::Loss));

        let result = ClusterEngine::new(ClusteringConfig::default()).cluster(&customers, &[], 2);
        assert!(result.metrics.inertia.is_finite());
        assert!(result.metrics.silhouette_score.is_finite());
        let json = serde_json::to_value(&result.metrics).unwrap();
        assert!(json["inertia"].is_number());
    }

    #[test]
    fn test_classify_thresholds() {
        let engine = ClusterEngine::new(ClusteringConfig::default());
        assert_eq!(engine.classify(6_000_000.0, 0.9), PotentialTier::High);
        assert_eq!(engine.classify(6_000_000.0, 0.5), PotentialTier::Medium);
        assert_eq!(engine.classify(2_000_000.0, 0.9), PotentialTier::Medium);
        assert_eq!(engine.classify(500_000.0, 0.9), PotentialTier::Low);
        assert_eq!(engine.classify(6_000_000.0, 0.1), PotentialTier::Low);
    }
}
