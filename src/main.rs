//! POS Geo-Analytics report
//! Runs the clustering, forecasting and coverage engines over a data
//! directory and prints a text report (or the raw JSON).
//!
//! Run: ./target/release/pos_geo_analytics [--section all|clusters|forecast|coverage]

use anyhow::Result;
use clap::{Parser, ValueEnum};
use pos_geo_analytics::clustering::{ClusterResult, PotentialTier};
use pos_geo_analytics::coverage::RadiusAnalysisResult;
use pos_geo_analytics::forecasting::ForecastResult;
use pos_geo_analytics::{loader, AnalysisParams, EngineConfig, GeoAnalytics};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Section {
    All,
    Clusters,
    Forecast,
    Coverage,
}

#[derive(Parser, Debug)]
#[command(name = "pos_geo_analytics")]
#[command(about = "Geo-analytics report over POS customer and service point data")]
struct Args {
    /// Directory holding the collaborator CSV exports
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Engine configuration JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of clusters
    #[arg(short, long, default_value = "5")]
    k: usize,

    /// Forecast horizon in months
    #[arg(long, default_value = "6")]
    horizon: usize,

    /// Coverage radius override in km (each point's own radius when absent)
    #[arg(long)]
    radius: Option<f64>,

    /// Report section to print
    #[arg(long, value_enum, default_value = "all")]
    section: Section,

    /// Print the combined analysis as JSON instead of a report
    #[arg(long)]
    json: bool,
}

fn print_section_header(title: &str) {
    println!("\n{}", "═".repeat(90));
    println!("  {}", title);
    println!("{}\n", "═".repeat(90));
}

fn print_subsection(title: &str) {
    println!("\n{}", title);
    println!("{}", "─".repeat(80));
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.k >= 1, "k must be at least 1");
    anyhow::ensure!(args.horizon >= 1, "horizon must be at least 1 month");
    if let Some(r) = args.radius {
        anyhow::ensure!(r.is_finite() && r > 0.0, "radius must be positive, got {}", r);
    }

    let config = EngineConfig::load(args.config.as_deref())?;
    let dataset = loader::load_dataset(&args.data_dir, config.coverage.default_radius_km)?;
    info!(
        customers = dataset.customers.len(),
        service_points = dataset.service_points.len(),
        "dataset loaded"
    );

    let analytics = GeoAnalytics::new(config);
    let params = AnalysisParams {
        k: args.k,
        horizon_months: args.horizon,
        radius_km: args.radius,
    };

    if args.json {
        let analysis = analytics.analyze(&dataset, &params);
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        return Ok(());
    }

    println!("\n{}", "█".repeat(90));
    println!("{}  POS GEO-ANALYTICS REPORT  {}", "█".repeat(31), "█".repeat(31));
    println!("{}\n", "█".repeat(90));
    println!(
        "Customers: {} | Service points: {} | Monthly stat rows: {}",
        dataset.customers.len(),
        dataset.service_points.len(),
        dataset.monthly_stats.len()
    );

    if matches!(args.section, Section::All | Section::Clusters) {
        report_clusters(&analytics.clusters(&dataset, params.k));
    }
    if matches!(args.section, Section::All | Section::Forecast) {
        report_forecast(&analytics.forecast(&dataset, params.horizon_months));
    }
    if matches!(args.section, Section::All | Section::Coverage) {
        report_coverage(&analytics.coverage(&dataset, params.radius_km));
    }

    println!("\n{}", "█".repeat(90));
    Ok(())
}

fn report_clusters(result: &ClusterResult) {
    print_section_header("CUSTOMER CLUSTERS");

    let m = &result.metrics;
    println!(
        "{} clusters | silhouette {:.3} | inertia {:.3} | {} iterations{}",
        m.cluster_count,
        m.silhouette_score,
        m.inertia,
        m.iterations,
        if m.converged { "" } else { " (not converged)" }
    );
    println!(
        "High potential: {} | Low potential: {}",
        m.high_potential_count, m.low_potential_count
    );

    for cluster in &result.clusters {
        let indicator = match cluster.potential {
            PotentialTier::High => "🟢",
            PotentialTier::Medium => "🟡",
            PotentialTier::Low => "🔴",
        };
        print_subsection(&format!(
            "{} Cluster {} ({} customers, {:?} potential)",
            indicator, cluster.id, cluster.customer_count, cluster.potential
        ));
        println!(
            "   Centroid: {:.4}, {:.4} | Avg profit: {:.0} | Active: {:.1}%",
            cluster.centroid.lat,
            cluster.centroid.lng,
            cluster.average_profit,
            cluster.active_ratio * 100.0
        );
        println!("   Dominant business: {}", cluster.dominant_business_type);
        for line in &cluster.characteristics {
            println!("   • {}", line);
        }
    }
}

fn report_forecast(result: &ForecastResult) {
    print_section_header(&format!("REGIONAL FORECAST ({} MONTHS)", result.horizon_months));

    println!(
        "Overall growth: {:+.1}% | Confidence: {:.0}%",
        result.overall_growth,
        result.confidence * 100.0
    );

    print_subsection("Regions");
    println!(
        "{:<28} {:>14} {:>14} {:>9} {:>10} {:>6}",
        "Region", "Current", "Forecast", "Growth", "Trend", "Conf"
    );
    for f in &result.region_forecasts {
        println!(
            "{:<28} {:>14.0} {:>14.0} {:>8.1}% {:>10} {:>5.0}%",
            truncate(&f.region_name, 28),
            f.current_sales,
            f.forecast_sales,
            f.growth_rate,
            format!("{:?}", f.trend),
            f.confidence * 100.0
        );
    }

    if !result.expansion_suggestions.is_empty() {
        print_subsection("Expansion candidates");
        for (i, s) in result.expansion_suggestions.iter().enumerate() {
            println!(
                "{}. ({:.4}, {:.4}) score {:.2} | {} customers | {:.0}/yr",
                i + 1,
                s.coordinate.lat,
                s.coordinate.lng,
                s.score,
                s.estimated_customers,
                s.estimated_revenue
            );
            println!("   {}", s.reasoning);
        }
    }
}

fn report_coverage(result: &RadiusAnalysisResult) {
    print_section_header("SERVICE POINT COVERAGE");

    let stats = &result.coverage_stats;
    println!(
        "Covered {}/{} customers ({:.1}%) | avg nearest {:.2} km | max {:.2} km",
        stats.covered_customers,
        stats.total_customers,
        stats.coverage_percentage,
        stats.average_distance_km,
        stats.max_distance_km
    );

    print_subsection("Service points");
    for p in &result.service_points {
        println!(
            "{:<28} {:>6.1} km {:>6} customers {:>14.0} revenue {:>6.1}%",
            truncate(&p.name, 28),
            p.radius_km,
            p.customer_count,
            p.total_revenue,
            p.coverage_efficiency
        );
    }

    if !result.suggested_locations.is_empty() {
        print_subsection("Suggested new locations");
        for (i, s) in result.suggested_locations.iter().enumerate() {
            println!(
                "{}. ({:.4}, {:.4}) {} customers | {:.0}/yr",
                i + 1,
                s.coordinate.lat,
                s.coordinate.lng,
                s.estimated_customers,
                s.estimated_revenue
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
