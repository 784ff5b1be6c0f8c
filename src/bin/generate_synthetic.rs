//! Synthetic data generator for the POS geo-analytics dataset
//!
//! Writes `customers.csv`, `service_points.csv` and `monthly_stats.csv` into
//! an output directory. Customers are scattered around a handful of commercial
//! hotspots; each gets a monthly revenue history with a per-hotspot trend.
//!
//! Usage:
//!   cargo run --release --bin generate_synthetic -- [OPTIONS]
//!
//! Options:
//!   --customers <N>      Number of customers (default: 2000)
//!   --hotspots <N>       Number of commercial hotspots (default: 6)
//!   --months <N>         Months of history per customer (default: 12)
//!   --seed <N>           Random seed for reproducibility (optional)
//!   --output <DIR>       Output directory (default: data)

use anyhow::Result;
use chrono::{Datelike, Duration, Months, NaiveDate};
use clap::Parser;
use csv::WriterBuilder;
use pos_geo_analytics::loader::{CUSTOMERS_FILE, MONTHLY_STATS_FILE, SERVICE_POINTS_FILE};
use rand::prelude::*;
use rand::rngs::StdRng;
use serde::Serialize;
use std::path::PathBuf;

/// Synthetic data generator for the geo-analytics dashboard
#[derive(Parser, Debug)]
#[command(name = "generate_synthetic")]
#[command(about = "Generate synthetic POS customers, service points and monthly stats")]
struct Args {
    /// Number of customers to generate
    #[arg(long, default_value = "2000")]
    customers: usize,

    /// Number of commercial hotspots customers cluster around
    #[arg(long, default_value = "6")]
    hotspots: usize,

    /// Months of transaction history per customer
    #[arg(long, default_value = "12")]
    months: u32,

    /// Fraction of customers exported without coordinates (0.0 - 1.0)
    #[arg(long, default_value = "0.02")]
    missing_coordinate_rate: f64,

    /// City centre latitude
    #[arg(long, default_value = "38.08")]
    center_lat: f64,

    /// City centre longitude
    #[arg(long, default_value = "46.29")]
    center_lng: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory
    #[arg(long, default_value = "data")]
    output: PathBuf,
}

#[derive(Debug, Serialize)]
struct CustomerRow {
    id: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    monthly_profit: f64,
    business_type: &'static str,
    status: &'static str,
    created_at: String,
    unit_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ServicePointRow {
    id: String,
    name: String,
    kind: &'static str,
    latitude: f64,
    longitude: f64,
    coverage_radius: Option<f64>,
}

#[derive(Debug, Serialize)]
struct MonthlyStatRow {
    customer_id: String,
    service_point_id: Option<String>,
    year: i32,
    month: u32,
    transaction_count: u64,
    amount: f64,
}

const BUSINESS_TYPES: &[&str] = &[
    "grocery",
    "restaurant",
    "pharmacy",
    "clothing",
    "electronics",
    "bakery",
    "gas-station",
];

/// (status, cumulative weight)
const STATUS_WEIGHTS: &[(&str, f64)] = &[
    ("active", 0.55),
    ("normal", 0.80),
    ("marketing", 0.90),
    ("loss", 0.97),
    ("collected", 1.00),
];

struct Hotspot {
    lat: f64,
    lng: f64,
    spread_deg: f64,
    /// Monthly revenue growth ratio for customers in this hotspot
    growth: f64,
    profit_scale: f64,
}

/// Roughly normal offset from the sum of uniforms.
fn jitter(rng: &mut impl Rng, scale: f64) -> f64 {
    let sum: f64 = (0..4).map(|_| rng.gen_range(-1.0..1.0_f64)).sum();
    sum / 2.0 * scale
}

fn pick_status(rng: &mut impl Rng) -> &'static str {
    let roll = rng.gen::<f64>();
    STATUS_WEIGHTS
        .iter()
        .find(|(_, w)| roll < *w)
        .map(|(s, _)| *s)
        .unwrap_or("normal")
}

fn make_hotspots(args: &Args, rng: &mut impl Rng) -> Vec<Hotspot> {
    (0..args.hotspots.max(1))
        .map(|_| Hotspot {
            lat: args.center_lat + jitter(rng, 0.08),
            lng: args.center_lng + jitter(rng, 0.08),
            spread_deg: rng.gen_range(0.005..0.03),
            growth: rng.gen_range(-0.04..0.06),
            profit_scale: rng.gen_range(5e5..8e6),
        })
        .collect()
}

/// Branches sit on most hotspots; some hotspots are left unserved so the
/// coverage and expansion reports have something to find.
fn make_service_points(hotspots: &[Hotspot], rng: &mut impl Rng) -> Vec<ServicePointRow> {
    let mut points = Vec::new();
    for (i, h) in hotspots.iter().enumerate() {
        if rng.gen_bool(0.3) {
            continue;
        }
        points.push(ServicePointRow {
            id: format!("b{}", i + 1),
            name: format!("Branch {}", i + 1),
            kind: "branch",
            latitude: h.lat + jitter(rng, 0.005),
            longitude: h.lng + jitter(rng, 0.005),
            coverage_radius: if rng.gen_bool(0.5) { Some(rng.gen_range(2.0..6.0)) } else { None },
        });
        if rng.gen_bool(0.4) {
            points.push(ServicePointRow {
                id: format!("u{}", i + 1),
                name: format!("Banking Unit {}", i + 1),
                kind: "banking-unit",
                latitude: h.lat + jitter(rng, h.spread_deg),
                longitude: h.lng + jitter(rng, h.spread_deg),
                coverage_radius: Some(rng.gen_range(1.0..3.0)),
            });
        }
    }
    points
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("🔧 Synthetic POS Data Generator");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Output:           {}", args.output.display());
    println!("Customers:        {}", args.customers);
    println!("Hotspots:         {}", args.hotspots);
    println!("Months:           {}", args.months);
    println!("Centre:           {:.4}, {:.4}", args.center_lat, args.center_lng);
    if let Some(seed) = args.seed {
        println!("Random seed:      {}", seed);
    }
    println!();

    let mut rng: StdRng = match args.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    std::fs::create_dir_all(&args.output)?;

    let hotspots = make_hotspots(&args, &mut rng);
    let service_points = make_service_points(&hotspots, &mut rng);

    println!("🏭 Writing {} service points...", service_points.len());
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(args.output.join(SERVICE_POINTS_FILE))?;
    for point in &service_points {
        writer.serialize(point)?;
    }
    writer.flush()?;

    println!("🏭 Writing {} customers and their history...", args.customers);
    let mut customer_writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(args.output.join(CUSTOMERS_FILE))?;
    let mut stats_writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(args.output.join(MONTHLY_STATS_FILE))?;

    let first_month = NaiveDate::from_ymd_opt(2024, 1, 1)
        .ok_or_else(|| anyhow::anyhow!("invalid start date"))?;
    let missing_rate = args.missing_coordinate_rate.clamp(0.0, 1.0);
    let mut stat_rows = 0usize;

    for i in 0..args.customers {
        let hotspot = &hotspots[rng.gen_range(0..hotspots.len())];
        let lat = hotspot.lat + jitter(&mut rng, hotspot.spread_deg);
        let lng = hotspot.lng + jitter(&mut rng, hotspot.spread_deg);
        let located = !rng.gen_bool(missing_rate);
        let status = pick_status(&mut rng);
        let profit_sign = if status == "loss" { -0.3 } else { 1.0 };
        let monthly_profit = (hotspot.profit_scale * rng.gen_range(0.2..1.8) * profit_sign).round();
        let created = first_month - Duration::days(rng.gen_range(0..720));
        let unit_id = if rng.gen_bool(0.3) && !service_points.is_empty() {
            service_points.choose(&mut rng).map(|p| p.id.clone())
        } else {
            None
        };
        let id = format!("c{:05}", i + 1);

        customer_writer.serialize(CustomerRow {
            id: id.clone(),
            latitude: located.then_some(lat),
            longitude: located.then_some(lng),
            monthly_profit,
            business_type: BUSINESS_TYPES.choose(&mut rng).copied().unwrap_or("grocery"),
            status,
            created_at: created.format("%Y-%m-%d 09:00:00").to_string(),
            unit_id,
        })?;

        let base = monthly_profit.abs().max(1e5) * 3.0;
        for m in 0..args.months {
            let month_start = first_month
                .checked_add_months(Months::new(m))
                .ok_or_else(|| anyhow::anyhow!("month {} out of range", m))?;
            let trend = 1.0 + hotspot.growth * m as f64;
            let amount = (base * trend * rng.gen_range(0.85..1.15)).max(0.0).round();
            stats_writer.serialize(MonthlyStatRow {
                customer_id: id.clone(),
                service_point_id: None,
                year: month_start.year(),
                month: month_start.month(),
                transaction_count: rng.gen_range(5..200),
                amount,
            })?;
            stat_rows += 1;
        }
    }
    customer_writer.flush()?;
    stats_writer.flush()?;

    println!();
    println!("✅ Done");
    println!("   Service points:   {}", service_points.len());
    println!("   Customers:        {}", args.customers);
    println!("   Monthly stat rows: {}", stat_rows);

    Ok(())
}
