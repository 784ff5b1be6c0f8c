//! Geographic primitives shared by every engine.
//!
//! All distance math goes through [`haversine_distance`] and every engine
//! filters input through [`Coordinate::parse`], so cluster, forecast and
//! coverage outputs stay mutually consistent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mean Earth radius in kilometres.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Kilometres spanned by one degree of latitude on the haversine sphere.
const KM_PER_DEGREE: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// A validated latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lng.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lng);
        valid.then_some(Self { lat, lng })
    }

    /// Parse the nullable coordinate strings collaborators hand us.
    /// Missing, blank or unparsable values yield `None`.
    pub fn parse(lat: Option<&str>, lng: Option<&str>) -> Option<Self> {
        let lat = lat?.trim().parse::<f64>().ok()?;
        let lng = lng?.trim().parse::<f64>().ok()?;
        Self::new(lat, lng)
    }

    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        haversine_distance(self.lat, self.lng, other.lat, other.lng)
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = ((d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

/// Min-max normalize each column of `matrix` into [0, 1].
///
/// A column whose values are all equal maps every row to 0, as does any
/// non-finite cell. Rows are expected to share one width; the first row
/// decides it.
pub fn normalize_features(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = matrix.first() else {
        return Vec::new();
    };
    let width = first.len();

    let mut mins = vec![f64::INFINITY; width];
    let mut maxs = vec![f64::NEG_INFINITY; width];
    for row in matrix {
        for (col, &value) in row.iter().enumerate().take(width) {
            if !value.is_finite() {
                continue;
            }
            mins[col] = mins[col].min(value);
            maxs[col] = maxs[col].max(value);
        }
    }

    matrix
        .iter()
        .map(|row| {
            (0..width)
                .map(|col| {
                    let range = maxs[col] - mins[col];
                    if range > 0.0 && range.is_finite() && row[col].is_finite() {
                        (row[col] - mins[col]) / range
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Integer id of a fixed-size grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellKey {
    pub row: i64,
    pub col: i64,
}

/// Floor-based grid cell for a point. Points on a cell boundary belong to
/// the lower cell.
pub fn grid_bin(lat: f64, lng: f64, cell_size_degrees: f64) -> CellKey {
    CellKey {
        row: (lat / cell_size_degrees).floor() as i64,
        col: (lng / cell_size_degrees).floor() as i64,
    }
}

/// Hash-map spatial index over coordinates, keyed by grid cell.
///
/// Stores indices into the caller's slice so results can be mapped back
/// without cloning records.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
}

impl SpatialGrid {
    pub fn new(cell_size_degrees: f64) -> Self {
        Self {
            cell_size: cell_size_degrees,
            cells: HashMap::new(),
        }
    }

    pub fn from_coordinates<'a, I>(cell_size_degrees: f64, coordinates: I) -> Self
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mut grid = Self::new(cell_size_degrees);
        for (idx, coordinate) in coordinates.into_iter().enumerate() {
            grid.insert(idx, coordinate);
        }
        grid
    }

    pub fn insert(&mut self, idx: usize, coordinate: &Coordinate) {
        let key = grid_bin(coordinate.lat, coordinate.lng, self.cell_size);
        self.cells.entry(key).or_default().push(idx);
    }

    /// Indices whose coordinate lies within `radius_km` of `center`,
    /// ascending. `coordinates` must be the slice the grid was built from.
    ///
    /// The search window wraps across the antimeridian. When the window
    /// holds more cells than the grid has occupied, the occupied cells are
    /// scanned directly instead.
    pub fn within_radius(
        &self,
        coordinates: &[Coordinate],
        center: &Coordinate,
        radius_km: f64,
    ) -> Vec<usize> {
        let lat_span = radius_km / KM_PER_DEGREE;
        // Longitude degrees shrink with latitude; use the widest latitude the
        // search box reaches.
        let widest_lat = (center.lat.abs() + lat_span).min(89.999);
        let lng_span = (radius_km / (KM_PER_DEGREE * widest_lat.to_radians().cos())).min(180.0);

        let low = grid_bin((center.lat - lat_span).max(-90.0), center.lng - lng_span, self.cell_size);
        let high = grid_bin((center.lat + lat_span).min(90.0), center.lng + lng_span, self.cell_size);
        let window = (high.row - low.row + 1).saturating_mul(high.col - low.col + 1);

        let mut found = Vec::new();
        let mut collect = |indices: &[usize]| {
            for &idx in indices {
                if coordinates[idx].distance_to(center) <= radius_km {
                    found.push(idx);
                }
            }
        };

        if lng_span >= 180.0 || window >= self.cells.len() as i64 {
            for indices in self.cells.values() {
                collect(indices);
            }
        } else {
            let turn = (360.0 / self.cell_size).round() as i64;
            let mut col_ranges = vec![(low.col, high.col)];
            // One spare column each side absorbs cell sizes that do not
            // divide 360 evenly.
            if center.lng - lng_span < -180.0 {
                col_ranges.push((low.col + turn - 1, high.col + turn + 1));
            }
            if center.lng + lng_span > 180.0 {
                col_ranges.push((low.col - turn - 1, high.col - turn + 1));
            }
            for (first, last) in col_ranges {
                for row in low.row..=high.row {
                    for col in first..=last {
                        if let Some(indices) = self.cells.get(&CellKey { row, col }) {
                            collect(indices);
                        }
                    }
                }
            }
        }

        found.sort_unstable();
        found.dedup();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_symmetry_and_identity() {
        let a = (38.08, 46.29);
        let b = (35.6892, 51.3890);
        let ab = haversine_distance(a.0, a.1, b.0, b.1);
        let ba = haversine_distance(b.0, b.1, a.0, a.1);
        assert_eq!(ab, ba);
        assert_eq!(haversine_distance(a.0, a.1, a.0, a.1), 0.0);
        // Tabriz to Tehran is roughly 530 km
        assert!((ab - 530.0).abs() < 20.0, "got {}", ab);
    }

    #[test]
    fn test_one_degree_latitude() {
        let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((d - KM_PER_DEGREE).abs() < 1e-9);
    }

    #[test]
    fn test_coordinate_parse() {
        assert!(Coordinate::parse(Some("38.08"), Some("46.29")).is_some());
        assert!(Coordinate::parse(Some(" 38.08 "), Some("46.29")).is_some());
        assert!(Coordinate::parse(None, Some("46.29")).is_none());
        assert!(Coordinate::parse(Some(""), Some("46.29")).is_none());
        assert!(Coordinate::parse(Some("abc"), Some("46.29")).is_none());
        assert!(Coordinate::parse(Some("NaN"), Some("46.29")).is_none());
        assert!(Coordinate::parse(Some("91"), Some("46.29")).is_none());
    }

    #[test]
    fn test_normalize_features() {
        let matrix = vec![vec![0.0, 5.0, 10.0], vec![5.0, 5.0, 20.0], vec![10.0, 5.0, 30.0]];
        let normalized = normalize_features(&matrix);
        assert_eq!(normalized[0], vec![0.0, 0.0, 0.0]);
        assert_eq!(normalized[1], vec![0.5, 0.0, 0.5]);
        assert_eq!(normalized[2], vec![1.0, 0.0, 1.0]);
        assert!(normalize_features(&[]).is_empty());
    }

    #[test]
    fn test_normalize_features_ignores_non_finite() {
        let matrix = vec![vec![0.0], vec![f64::NAN], vec![f64::INFINITY], vec![10.0]];
        let normalized = normalize_features(&matrix);
        let column: Vec<f64> = normalized.iter().map(|row| row[0]).collect();
        assert_eq!(column, vec![0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_grid_bin_boundary_goes_low() {
        let key = grid_bin(0.1, -0.1, 0.05);
        // 0.1 / 0.05 may land a hair under 2.0 in floating point; either way
        // the cell must be the one starting at or below the point.
        assert!(key.row as f64 * 0.05 <= 0.1);
        assert_eq!(grid_bin(0.0, 0.0, 0.05), CellKey { row: 0, col: 0 });
        assert_eq!(grid_bin(-0.01, 0.01, 0.05), CellKey { row: -1, col: 0 });
        assert_eq!(grid_bin(1.0, 2.0, 0.5), CellKey { row: 2, col: 4 });
    }

    #[test]
    fn test_spatial_grid_matches_linear_scan() {
        let points: Vec<Coordinate> = (0..40)
            .map(|i| {
                let f = i as f64;
                Coordinate::new(38.0 + (f * 0.013) % 0.3, 46.2 + (f * 0.029) % 0.3).unwrap()
            })
            .collect();
        let grid = SpatialGrid::from_coordinates(0.02, &points);
        let center = Coordinate::new(38.1, 46.3).unwrap();

        for radius in [0.5, 2.0, 7.5, 25.0] {
            let expected: Vec<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, p)| p.distance_to(&center) <= radius)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(grid.within_radius(&points, &center, radius), expected);
        }
    }

    #[test]
    fn test_spatial_grid_wraps_antimeridian() {
        let points = vec![
            Coordinate::new(0.0, -179.99).unwrap(),
            Coordinate::new(0.0, 179.98).unwrap(),
            Coordinate::new(0.0, 170.0).unwrap(),
        ];
        let grid = SpatialGrid::from_coordinates(0.05, &points);

        let east = Coordinate::new(0.0, 179.99).unwrap();
        assert_eq!(grid.within_radius(&points, &east, 5.0), vec![0, 1]);

        let west = Coordinate::new(0.0, -179.995).unwrap();
        assert_eq!(grid.within_radius(&points, &west, 5.0), vec![0, 1]);
    }

    #[test]
    fn test_spatial_grid_huge_radius_scans_occupied_cells() {
        let points = vec![
            Coordinate::new(38.08, 46.29).unwrap(),
            Coordinate::new(-33.86, 151.21).unwrap(),
            Coordinate::new(51.50, -0.12).unwrap(),
        ];
        let grid = SpatialGrid::from_coordinates(0.05, &points);
        let center = Coordinate::new(38.08, 46.29).unwrap();

        assert_eq!(grid.within_radius(&points, &center, 20_000.0), vec![0, 1, 2]);
        assert_eq!(grid.within_radius(&points, &center, 5_000.0), vec![0, 2]);
    }
}
