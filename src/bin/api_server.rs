//! REST API Server for POS Geo-Analytics
//!
//! Usage:
//!   ./target/release/api_server [options]
//!
//! Options:
//!   --port PORT         Port to listen on (default: 8080)
//!   --data-dir PATH     Directory of collaborator CSV exports (default: data)
//!   --config PATH       Engine configuration JSON (optional)
//!
//! REST endpoints:
//!   GET /api/v1/health                          - Health check
//!   GET /api/v1/stats                           - Dataset statistics
//!   GET /api/v1/clusters?k=N                    - Customer clusters
//!   GET /api/v1/forecast?horizon=N              - Regional sales forecast
//!   GET /api/v1/coverage?radius=KM              - Service point coverage
//!   GET /api/v1/dashboard?k=N&horizon=N&radius=KM - All three combined

use anyhow::Result;
use clap::Parser;
use pos_geo_analytics::api::{self, AnalyticsService, DataSource};
use pos_geo_analytics::EngineConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "api_server")]
#[command(about = "Serve POS geo-analytics over REST")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Directory holding customers.csv, service_points.csv and monthly_stats.csv
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Engine configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,
}

fn print_banner(args: &Args, config: &EngineConfig) {
    println!("============================================================");
    println!("            POS GEO-ANALYTICS API SERVER");
    println!("============================================================");
    println!();
    println!("  Port:     {}", args.port);
    println!("  REST:     http://localhost:{}/api/v1/", args.port);
    println!("  Data:     {}", args.data_dir.display());
    println!("  Timeout:  {} ms per engine", config.engine_timeout_ms);
    println!();
    println!("REST Endpoints:");
    println!("  GET /api/v1/health              Health check");
    println!("  GET /api/v1/stats               Dataset statistics");
    println!("  GET /api/v1/clusters?k=N        Customer clusters");
    println!("  GET /api/v1/forecast?horizon=N  Regional forecast");
    println!("  GET /api/v1/coverage?radius=KM  Coverage analysis");
    println!("  GET /api/v1/dashboard           Combined dashboard");
    println!();
    println!("============================================================");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .init();

    let args = Args::parse();
    let config = EngineConfig::load(args.config.as_deref())?;

    print_banner(&args, &config);

    let service = Arc::new(AnalyticsService::new(
        DataSource::Directory(args.data_dir.clone()),
        config,
    ));
    let app = api::router(service);

    let addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    tracing::info!("Starting REST server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
