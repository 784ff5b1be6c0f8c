//! CSV loaders for the collaborator exports.
//!
//! A data directory holds `customers.csv`, `service_points.csv` and
//! `monthly_stats.csv`. Only the customer file is required. Malformed rows
//! are skipped and counted; they never abort a load.

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::analytics::Dataset;
use crate::models::{CustomerLocation, CustomerRecord, MonthlyStat, ServicePoint, ServicePointRecord};

pub const CUSTOMERS_FILE: &str = "customers.csv";
pub const SERVICE_POINTS_FILE: &str = "service_points.csv";
pub const MONTHLY_STATS_FILE: &str = "monthly_stats.csv";

/// Raw monthly stat row
#[derive(Debug, Clone, Deserialize)]
struct MonthlyStatRecord {
    customer_id: Option<String>,
    service_point_id: Option<String>,
    year: i32,
    month: u32,
    transaction_count: u64,
    amount: f64,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

impl From<MonthlyStatRecord> for MonthlyStat {
    fn from(r: MonthlyStatRecord) -> Self {
        MonthlyStat {
            customer_id: blank_to_none(r.customer_id),
            service_point_id: blank_to_none(r.service_point_id),
            year: r.year,
            month: r.month,
            transaction_count: r.transaction_count,
            amount: r.amount,
        }
    }
}

/// Deserialize every row of `path`, skipping rows that fail.
fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut rows = Vec::new();
    let mut error_count = 0;
    for (i, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                if error_count < 5 {
                    warn!("Skipping row {} of {}: {}", i + 1, path.display(), e);
                }
                error_count += 1;
            }
        }
    }

    info!("Parsed {} rows from {:?} ({} skipped)", rows.len(), path, error_count);
    Ok(rows)
}

pub fn load_customers(path: &Path) -> Result<Vec<CustomerLocation>> {
    let records: Vec<CustomerRecord> = read_rows(path)?;
    let customers: Vec<CustomerLocation> = records.iter().map(CustomerRecord::to_customer).collect();
    let unlocated = customers.iter().filter(|c| c.coordinate.is_none()).count();
    if unlocated > 0 {
        info!("{} customers have no usable coordinate and will be excluded", unlocated);
    }
    Ok(customers)
}

pub fn load_service_points(path: &Path, default_radius_km: f64) -> Result<Vec<ServicePoint>> {
    let records: Vec<ServicePointRecord> = read_rows(path)?;
    Ok(records
        .iter()
        .map(|r| r.to_service_point(default_radius_km))
        .collect())
}

/// Rows with a non-finite amount are dropped.
pub fn load_monthly_stats(path: &Path) -> Result<Vec<MonthlyStat>> {
    let records: Vec<MonthlyStatRecord> = read_rows(path)?;
    let total = records.len();
    let stats: Vec<MonthlyStat> = records
        .into_iter()
        .filter(|r| r.amount.is_finite())
        .map(MonthlyStat::from)
        .collect();
    if stats.len() < total {
        warn!("Dropped {} monthly stat rows with a non-finite amount", total - stats.len());
    }
    Ok(stats)
}

/// Load a full dataset from `dir`. Missing optional files load as empty.
pub fn load_dataset(dir: &Path, default_radius_km: f64) -> Result<Dataset> {
    let customers = load_customers(&dir.join(CUSTOMERS_FILE))?;

    let points_path = dir.join(SERVICE_POINTS_FILE);
    let service_points = if points_path.exists() {
        load_service_points(&points_path, default_radius_km)?
    } else {
        warn!("{:?} not found; analysing without service points", points_path);
        Vec::new()
    };

    let stats_path = dir.join(MONTHLY_STATS_FILE);
    let monthly_stats = if stats_path.exists() {
        load_monthly_stats(&stats_path)?
    } else {
        warn!("{:?} not found; forecasting from customer profit only", stats_path);
        Vec::new()
    };

    Ok(Dataset {
        customers,
        service_points,
        monthly_stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, lines: &[&str]) {
        let mut file = std::fs::File::create(dir.path().join(name)).unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
    }

    #[test]
    fn test_load_dataset() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            CUSTOMERS_FILE,
            &[
                "id,latitude,longitude,monthly_profit,business_type,status,created_at,unit_id",
                "c1,38.08,46.29,6000000,grocery,active,2024-01-05 09:00:00,b1",
                "c2,,46.30,100,grocery,loss,,",
                "c3,38.10,46.31,not-a-number,pharmacy,normal,,",
                "c4,38.11,46.32,250,pharmacy,marketing,someday,",
                "c5,38.12,46.33,NaN,pharmacy,active,,",
            ],
        );
        write_file(
            &dir,
            SERVICE_POINTS_FILE,
            &[
                "id,name,kind,latitude,longitude,coverage_radius",
                "b1,Central Branch,branch,38.08,46.29,",
                "u1,Bazaar Counter,banking-unit,38.09,46.30,2.5",
            ],
        );
        write_file(
            &dir,
            MONTHLY_STATS_FILE,
            &[
                "customer_id,service_point_id,year,month,transaction_count,amount",
                "c1,,2024,1,30,1500000",
                ",b1,2024,1,300,9000000",
                "c1,,2024,2,12,inf",
                "c5,,2024,2,12,NaN",
            ],
        );

        let dataset = load_dataset(dir.path(), 5.0).unwrap();
        // c3 fails to deserialize; c4 keeps its row without a timestamp
        assert_eq!(dataset.customers.len(), 4);
        assert!(dataset.customers[1].coordinate.is_none());
        assert_eq!(dataset.customers[2].id, "c4");
        assert!(dataset.customers[2].created_at.is_none());
        assert_eq!(dataset.customers[3].id, "c5");
        assert_eq!(dataset.customers[3].monthly_profit, 0.0);
        assert_eq!(dataset.service_points[0].coverage_radius_km, 5.0);
        assert_eq!(dataset.service_points[1].coverage_radius_km, 2.5);
        assert_eq!(dataset.monthly_stats.len(), 2);
        assert_eq!(dataset.monthly_stats[0].service_point_id, None);
        assert_eq!(dataset.monthly_stats[1].customer_id, None);
    }

    #[test]
    fn test_optional_files() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            CUSTOMERS_FILE,
            &["id,latitude,longitude,monthly_profit,business_type,status,created_at,unit_id"],
        );
        let dataset = load_dataset(dir.path(), 5.0).unwrap();
        assert!(dataset.customers.is_empty());
        assert!(dataset.service_points.is_empty());
        assert!(dataset.monthly_stats.is_empty());
    }

    #[test]
    fn test_missing_customers_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(load_dataset(dir.path(), 5.0).is_err());
    }
}
