use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::geo::Coordinate;

/// Raw customer row as exported by the POS backend
#[derive(Debug, Clone, Deserialize)]
pub struct CustomerRecord {
    pub id: String,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub monthly_profit: Option<f64>,
    pub business_type: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<String>,
    pub unit_id: Option<String>,
}

/// Raw branch / banking-unit row
#[derive(Debug, Clone, Deserialize)]
pub struct ServicePointRecord {
    pub id: String,
    pub name: String,
    pub kind: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub coverage_radius: Option<f64>,
}

/// Customer device operating status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CustomerStatus {
    Active,
    Normal,
    Marketing,
    Loss,
    Collected,
}

impl CustomerStatus {
    /// Fixed ordinal used as a clustering feature.
    pub fn ordinal(self) -> f64 {
        match self {
            CustomerStatus::Active => 0.0,
            CustomerStatus::Normal => 1.0,
            CustomerStatus::Marketing => 2.0,
            CustomerStatus::Loss => 3.0,
            CustomerStatus::Collected => 4.0,
        }
    }
}

impl From<&str> for CustomerStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => CustomerStatus::Active,
            "marketing" => CustomerStatus::Marketing,
            "loss" => CustomerStatus::Loss,
            "collected" => CustomerStatus::Collected,
            _ => CustomerStatus::Normal, // default
        }
    }
}

/// Kind of banking service point
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ServicePointKind {
    Branch,
    BankingUnit,
}

impl From<&str> for ServicePointKind {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "banking-unit" | "banking_unit" | "unit" | "counter" | "kiosk" => {
                ServicePointKind::BankingUnit
            }
            _ => ServicePointKind::Branch,
        }
    }
}

/// A customer device location. `coordinate` is `None` when either
/// component was missing or unparsable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerLocation {
    pub id: String,
    pub coordinate: Option<Coordinate>,
    pub monthly_profit: f64,
    pub business_type: String,
    pub status: CustomerStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub unit_id: Option<String>,
}

impl CustomerLocation {
    pub fn new(
        id: impl Into<String>,
        coordinate: Option<Coordinate>,
        monthly_profit: f64,
        business_type: impl Into<String>,
        status: CustomerStatus,
    ) -> Self {
        Self {
            id: id.into(),
            coordinate,
            monthly_profit,
            business_type: business_type.into(),
            status,
            created_at: None,
            unit_id: None,
        }
    }
}

/// Customers with a usable coordinate, in input order. Every engine filters
/// through this.
pub fn located_customers(customers: &[CustomerLocation]) -> Vec<(&CustomerLocation, Coordinate)> {
    customers
        .iter()
        .filter_map(|c| c.coordinate.map(|coord| (c, coord)))
        .collect()
}

/// Branch or banking unit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePoint {
    pub id: String,
    pub name: String,
    pub kind: ServicePointKind,
    pub coordinate: Option<Coordinate>,
    pub coverage_radius_km: f64,
}

impl ServicePoint {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        kind: ServicePointKind,
        coordinate: Option<Coordinate>,
        coverage_radius_km: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            coordinate,
            coverage_radius_km,
        }
    }
}

/// Service points with a usable coordinate, in input order.
pub fn located_service_points(points: &[ServicePoint]) -> Vec<(&ServicePoint, Coordinate)> {
    points
        .iter()
        .filter_map(|p| p.coordinate.map(|coord| (p, coord)))
        .collect()
}

/// Monthly transaction bucket for a customer and/or a service point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyStat {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub service_point_id: Option<String>,
    pub year: i32,
    pub month: u32,
    pub transaction_count: u64,
    pub amount: f64,
}

/// Candidate site for a new service point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedLocation {
    pub coordinate: Coordinate,
    pub score: f64,
    pub estimated_customers: usize,
    pub estimated_revenue: f64,
    /// Distance from the cell centroid to the closest service point, if any.
    pub nearest_service_km: Option<f64>,
    pub reasoning: String,
}

const TIMESTAMP_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for format in TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    anyhow::bail!("unrecognized timestamp '{}'", raw)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl CustomerRecord {
    /// Unusable coordinates, timestamps or profits are dropped field by
    /// field; the customer itself is always kept.
    pub fn to_customer(&self) -> CustomerLocation {
        let created_at = non_blank(&self.created_at).and_then(|raw| match parse_timestamp(raw) {
            Ok(ts) => Some(ts),
            Err(e) => {
                warn!("customer {}: ignoring created_at: {:#}", self.id, e);
                None
            }
        });
        let monthly_profit = match self.monthly_profit {
            Some(p) if !p.is_finite() => {
                warn!("customer {}: non-finite monthly profit treated as 0", self.id);
                0.0
            }
            other => other.unwrap_or(0.0),
        };

        CustomerLocation {
            id: self.id.clone(),
            coordinate: Coordinate::parse(self.latitude.as_deref(), self.longitude.as_deref()),
            monthly_profit,
            business_type: non_blank(&self.business_type).unwrap_or("other").to_string(),
            status: non_blank(&self.status).map(CustomerStatus::from).unwrap_or(CustomerStatus::Normal),
            created_at,
            unit_id: non_blank(&self.unit_id).map(str::to_string),
        }
    }
}

impl ServicePointRecord {
    /// `default_radius_km` applies when the row has no usable radius.
    pub fn to_service_point(&self, default_radius_km: f64) -> ServicePoint {
        let coverage_radius_km = self
            .coverage_radius
            .filter(|r| r.is_finite() && *r > 0.0)
            .unwrap_or(default_radius_km);

        ServicePoint {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: non_blank(&self.kind).map(ServicePointKind::from).unwrap_or(ServicePointKind::Branch),
            coordinate: Coordinate::parse(self.latitude.as_deref(), self.longitude.as_deref()),
            coverage_radius_km,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(lat: Option<&str>, lng: Option<&str>) -> CustomerRecord {
        CustomerRecord {
            id: "c-1".to_string(),
            latitude: lat.map(str::to_string),
            longitude: lng.map(str::to_string),
            monthly_profit: Some(1500.0),
            business_type: Some("grocery".to_string()),
            status: Some("Active".to_string()),
            created_at: Some("2024-03-01 10:15:00".to_string()),
            unit_id: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_to_customer() {
        let customer = record(Some("38.08"), Some("46.29")).to_customer();
        assert_eq!(customer.status, CustomerStatus::Active);
        assert_eq!(customer.business_type, "grocery");
        assert!(customer.coordinate.is_some());
        assert!(customer.created_at.is_some());
        assert_eq!(customer.unit_id, None);
    }

    #[test]
    fn test_missing_coordinate_is_kept_but_unlocated() {
        let customers = vec![
            record(None, Some("46.29")).to_customer(),
            record(Some("38.08"), Some("46.29")).to_customer(),
        ];
        assert!(customers[0].coordinate.is_none());
        assert_eq!(located_customers(&customers).len(), 1);
    }

    #[test]
    fn test_bad_timestamp_keeps_customer() {
        let mut bad = record(Some("38.08"), Some("46.29"));
        bad.created_at = Some("yesterday".to_string());
        let customer = bad.to_customer();
        assert!(customer.created_at.is_none());
        assert!(customer.coordinate.is_some());
        assert_eq!(customer.monthly_profit, 1500.0);
    }

    #[test]
    fn test_non_finite_profit_becomes_zero() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut row = record(Some("38.08"), Some("46.29"));
            row.monthly_profit = Some(value);
            assert_eq!(row.to_customer().monthly_profit, 0.0);
        }
    }

    #[test]
    fn test_status_and_kind_parsing() {
        assert_eq!(CustomerStatus::from("LOSS"), CustomerStatus::Loss);
        assert_eq!(CustomerStatus::from("whatever"), CustomerStatus::Normal);
        assert_eq!(ServicePointKind::from("kiosk"), ServicePointKind::BankingUnit);
        assert_eq!(ServicePointKind::from("branch"), ServicePointKind::Branch);
    }

    #[test]
    fn test_service_point_radius_default() {
        let row = ServicePointRecord {
            id: "b-1".to_string(),
            name: "Central".to_string(),
            kind: None,
            latitude: Some("38.08".to_string()),
            longitude: Some("46.29".to_string()),
            coverage_radius: None,
        };
        assert_eq!(row.to_service_point(5.0).coverage_radius_km, 5.0);

        let row = ServicePointRecord { coverage_radius: Some(-1.0), ..row };
        assert_eq!(row.to_service_point(5.0).coverage_radius_km, 5.0);
    }
}
