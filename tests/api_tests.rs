//! REST host tests driven through the router with `oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use pos_geo_analytics::api::{self, AnalyticsService, DataSource};
use pos_geo_analytics::models::{CustomerLocation, CustomerStatus, ServicePoint, ServicePointKind};
use pos_geo_analytics::{Coordinate, Dataset, EngineConfig};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn dataset() -> Dataset {
    let mut customers: Vec<CustomerLocation> = (0..5)
        .map(|i| {
            CustomerLocation::new(
                format!("a{}", i),
                Coordinate::new(38.080 + i as f64 * 0.001, 46.290),
                6_000_000.0,
                "grocery",
                CustomerStatus::Active,
            )
        })
        .collect();
    customers.extend((0..3).map(|i| {
        CustomerLocation::new(
            format!("b{}", i),
            Coordinate::new(38.200 + i as f64 * 0.001, 46.400),
            200_000.0,
            "bakery",
            CustomerStatus::Loss,
        )
    }));
    customers.push(CustomerLocation::new("ghost", None, 0.0, "grocery", CustomerStatus::Normal));

    Dataset {
        customers,
        service_points: vec![ServicePoint::new(
            "b1",
            "Central Branch",
            ServicePointKind::Branch,
            Coordinate::new(38.08, 46.29),
            5.0,
        )],
        monthly_stats: Vec::new(),
    }
}

fn app() -> Router {
    let service = AnalyticsService::new(DataSource::Static(Arc::new(dataset())), EngineConfig::default());
    api::router(Arc::new(service))
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = get(app(), "/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn stats_count_located_customers() {
    let (status, body) = get(app(), "/api/v1/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalCustomers"], 9);
    assert_eq!(body["locatedCustomers"], 8);
    assert_eq!(body["servicePoints"], 1);
}

#[tokio::test]
async fn clusters_respect_k() {
    let (status, body) = get(app(), "/api/v1/clusters?k=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metrics"]["clusterCount"], 2);
    assert_eq!(body["assignments"].as_array().unwrap().len(), 8);
    assert_eq!(body["clusters"][0]["potential"], "high");
}

#[tokio::test]
async fn invalid_parameters_are_rejected() {
    for uri in [
        "/api/v1/clusters?k=0",
        "/api/v1/forecast?horizon=0",
        "/api/v1/coverage?radius=-2",
        "/api/v1/dashboard?k=0",
    ] {
        let (status, body) = get(app(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string(), "{}", uri);
    }

    // Unparseable values are rejected by the extractor itself.
    let (status, _) = get(app(), "/api/v1/clusters?k=many").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn coverage_uses_radius_override() {
    let (_, own) = get(app(), "/api/v1/coverage").await;
    assert_eq!(own["coverageStats"]["coveredCustomers"], 5);

    let (status, wide) = get(app(), "/api/v1/coverage?radius=50").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wide["coverageStats"]["coveredCustomers"], 8);
    assert_eq!(wide["servicePoints"][0]["radiusKm"], 50.0);
}

#[tokio::test]
async fn forecast_defaults_to_six_months() {
    let (status, body) = get(app(), "/api/v1/forecast").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["horizonMonths"], 6);
    assert!(body["regionForecasts"].is_array());
}

#[tokio::test]
async fn dashboard_combines_all_engines() {
    let (status, body) = get(app(), "/api/v1/dashboard?k=2&horizon=3&radius=5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clusters"]["metrics"]["clusterCount"], 2);
    assert_eq!(body["forecast"]["horizonMonths"], 3);
    assert_eq!(body["coverage"]["coverageStats"]["totalCustomers"], 8);
    assert_eq!(body["errors"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn missing_data_directory_is_a_server_error() {
    let service = AnalyticsService::new(
        DataSource::Directory("/nonexistent/pos-geo-data".into()),
        EngineConfig::default(),
    );
    let (status, body) = get(api::router(Arc::new(service)), "/api/v1/stats").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"].as_str().unwrap().contains("customers.csv"));
}
