//! # Seed Data Generator
//!
//! Populates the database with a small dairy round for development and
//! prints the resulting monthly statements.
//!
//! ## Usage
//! ```bash
//! # Seed the configured database (MILKBOOK_DB_PATH or the platform default)
//! cargo run -p milkbook-db --bin seed
//!
//! # Specify database path and month
//! cargo run -p milkbook-db --bin seed -- --db ./data/milkbook.db --month 2024-03
//! ```
//!
//! ## Generated Data
//! - A handful of clients (one inactive)
//! - Cow and buffalo prices, with one mid-month cow price change
//! - A delivery sheet for every day of the month, saved through
//!   `BillingService::save_day`
//! - A few raw duplicate records, as an old device sync would leave them

use chrono::{Duration, Utc};
use milkbook_core::{
    BillingMonth, Delivery, DesiredEntries, MilkType, Money, Quantity,
};
use milkbook_db::{AppConfig, BillingService, Database};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// (name, address, phone, cow litres, buffalo litres)
const CLIENTS: &[(&str, &str, &str, f64, f64)] = &[
    ("Asha Patil", "12 MG Road, Pune", "9876543210", 2.0, 0.0),
    ("Bina Shah", "4 FC Road, Pune", "9876543211", 1.5, 1.0),
    ("Chetan Rao", "88 Baner Road, Pune", "9876543212", 0.0, 2.5),
    ("Deepa Iyer", "7 Aundh Road, Pune", "9876543213", 1.0, 0.0),
    ("Farhan Khan", "31 Camp, Pune", "9876543214", 0.75, 0.5),
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,milkbook=debug,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let mut db_path: Option<PathBuf> = None;
    let mut month = BillingMonth::containing(Utc::now().date_naive());

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--month" | "-m" => {
                if i + 1 < args.len() {
                    month = BillingMonth::parse(&args[i + 1])?;
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("MilkBook Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>       Database file path (default: MILKBOOK_DB_PATH)");
                println!("  -m, --month <YYYY-MM> Month to fill (default: current month)");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = AppConfig::from_env()?;
    if let Some(path) = db_path {
        config.database_path = path;
    }

    println!("🥛 MilkBook Seed Data Generator");
    println!("================================");
    println!("Database: {}", config.database_path.display());
    println!("Month:    {}", month);
    println!();

    let db = Database::new(config.db_config()?).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    if !db.clients().list().await?.is_empty() {
        println!("⚠ Database already has clients");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let billing = BillingService::new(db.clone());
    let calendar = db.calendar();

    // Clients
    let mut round = Vec::with_capacity(CLIENTS.len());
    for (name, address, phone, cow, buffalo) in CLIENTS {
        let client = db.clients().create(name, address, phone).await?;
        round.push((client, *cow, *buffalo));
    }
    println!("✓ {} clients", round.len());

    // Prices: opened the day before the month, cow changes on the 16th
    let opened = calendar.local_midnight(month.first_day()) - Duration::hours(12);
    billing
        .set_price_at(MilkType::Cow, Money::from_rupees(50), opened)
        .await?;
    billing
        .set_price_at(MilkType::Buffalo, Money::from_rupees(65), opened)
        .await?;

    let mid_month = month
        .days()
        .nth(15)
        .ok_or("month shorter than 16 days")?;
    billing
        .set_price_at(
            MilkType::Cow,
            Money::from_rupees(52),
            calendar.local_midnight(mid_month) + Duration::hours(5),
        )
        .await?;
    println!("✓ Prices set (cow ₹50 → ₹52 from {})", mid_month);

    // Delivery sheets
    let mut saved = 0;
    for day in month.days() {
        let mut desired = DesiredEntries::new();
        for (client, cow, buffalo) in &round {
            desired.insert(
                (client.id.clone(), MilkType::Cow),
                Quantity::from_litres(*cow),
            );
            desired.insert(
                (client.id.clone(), MilkType::Buffalo),
                Quantity::from_litres(*buffalo),
            );
        }
        let plan = billing.save_day(day, &desired).await?;
        saved += plan.to_insert.len();
    }
    println!("✓ {} deliveries saved", saved);

    // Stale duplicates from an old sync: same client/day/milk, older timestamps
    let (asha, _, _) = &round[0];
    let first = month.first_day();
    for offset in 0..3 {
        let quantity = Quantity::from_whole_litres(9);
        let price = Money::from_rupees(50);
        db.deliveries()
            .insert(&Delivery {
                id: Uuid::new_v4().to_string(),
                client_id: asha.id.clone(),
                milk_type: MilkType::Cow,
                date: calendar.local_midnight(first),
                quantity,
                price_at_delivery: price,
                total_amount: price.for_quantity(quantity),
                created_at: Some(calendar.local_midnight(first) - Duration::days(offset + 1)),
            })
            .await?;
    }
    println!("✓ 3 stale duplicates inserted");

    // One client stops taking milk; they are still billed for this month
    let (farhan, _, _) = &round[round.len() - 1];
    db.clients().deactivate(&farhan.id).await?;

    let book = billing.monthly_statements(month).await?;
    println!();
    println!("{}: {}", config.business_name, book.month);
    println!("--------------------------------");
    for statement in &book.statements {
        println!(
            "{:<16} {:>10}  {}",
            statement.client_name,
            statement.total_quantity.to_string(),
            statement.total_amount
        );
    }
    println!("--------------------------------");
    println!(
        "{:<16} {:>10}  {}",
        "Total",
        book.grand_total_quantity().to_string(),
        book.grand_total_amount()
    );

    db.close().await;
    Ok(())
}
