use clap::Parser;
use std::fs::File;
use std::path::PathBuf;

use health_goals_service::fetcher::{parse_csv_reader, SheetFetcher};
use health_goals_service::metrics::{self, display_or_na, GoalTracked};
use health_goals_service::models::BaseTable;

#[derive(Parser)]
#[command(name = "inspect-sheet")]
#[command(about = "Load the goals sheet and print per-unit projections", long_about = None)]
struct Cli {
    /// Published CSV export to download
    #[arg(long, env = "SHEET_URL", conflicts_with = "file")]
    url: Option<String>,

    /// Local CSV file to read instead of downloading
    #[arg(long)]
    file: Option<PathBuf>,

    /// Only print this performance unit
    #[arg(long)]
    unit: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let table = match (&cli.file, &cli.url) {
        (Some(path), _) => {
            println!("Reading {}...\n", path.display());
            BaseTable::from_rows(parse_csv_reader(File::open(path)?)?)?
        }
        (None, Some(url)) => {
            println!("Fetching {}...\n", url);
            SheetFetcher::new(url.clone())?.fetch_table().await?
        }
        (None, None) => return Err("either --url (or SHEET_URL) or --file is required".into()),
    };

    println!(
        "{} records, {} units, {} rows rejected\n",
        table.records().len(),
        table.units().len(),
        table.rejected_rows()
    );

    let units: Vec<&str> = match &cli.unit {
        Some(unit) if table.contains_unit(unit) => vec![unit.as_str()],
        Some(unit) => return Err(format!("unknown unit: {}", unit).into()),
        None => table.units(),
    };

    for unit in units {
        println!("== {} ==", unit);
        for record in table.records_for_unit(unit) {
            let projection = record.project();
            println!(
                "  {:<10} goal {:<10} projected {:<8} {:?}  {}",
                record.label(),
                record.annual_goal.display(),
                projection.display(),
                projection.verdict,
                record.description
            );
        }

        let records: Vec<_> = table.records_for_unit(unit).collect();
        let aggregate = metrics::aggregate(records.iter().copied());
        let summary = metrics::unit_summary(records.iter().copied());
        println!(
            "  global mean {}  average compliance {}  months recorded {}",
            display_or_na(aggregate.global_mean),
            display_or_na(summary.average_compliance),
            summary.monthly_record_count
        );
        if let (Some(best), Some(worst)) = (aggregate.best, aggregate.worst) {
            println!(
                "  best row {} ({})  worst row {} ({})",
                best.position,
                display_or_na(Some(best.mean)),
                worst.position,
                display_or_na(Some(worst.mean))
            );
        }
        println!();
    }

    Ok(())
}
