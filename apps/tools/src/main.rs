use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use storage::{NewBusiness, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/directory.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a CSV export into the businesses table.
    Import {
        csv_path: PathBuf,
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
    },
    /// Insert synthetic rows for local development.
    Seed {
        count: usize,
    },
    /// Print the current table size.
    Count,
}

/// CSV row shape. `retailer_name` and `location` are the column names the
/// upstream export uses; the aliases map them onto the directory schema.
#[derive(Debug, Deserialize)]
struct ImportRecord {
    #[serde(alias = "retailer_name")]
    name: String,
    #[serde(alias = "location", default)]
    address: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    zip: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    email: String,
}

impl From<ImportRecord> for NewBusiness {
    fn from(record: ImportRecord) -> Self {
        NewBusiness {
            name: record.name,
            address: record.address,
            city: record.city,
            state: record.state,
            zip: record.zip,
            phone: record.phone,
            email: record.email,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::Import {
            csv_path,
            batch_size,
        } => {
            let batch_size = batch_size.max(1);
            let mut reader = csv::Reader::from_path(&csv_path)
                .with_context(|| format!("failed to open {}", csv_path.display()))?;

            let mut batch: Vec<NewBusiness> = Vec::with_capacity(batch_size);
            let mut total = 0u64;
            for record in reader.deserialize::<ImportRecord>() {
                let record = record.context("malformed CSV record")?;
                batch.push(record.into());
                if batch.len() == batch_size {
                    total += storage.insert_businesses(&batch).await?;
                    batch.clear();
                    println!("imported {total} records");
                }
            }
            if !batch.is_empty() {
                total += storage.insert_businesses(&batch).await?;
            }
            println!("import completed, {total} records total");
        }
        Command::Seed { count } => {
            let rows: Vec<NewBusiness> = (0..count)
                .map(|i| NewBusiness {
                    name: format!("Business {i:04}"),
                    address: format!("{i} Main St"),
                    city: "Springfield".to_string(),
                    state: ["CA", "NY", "WA", "OR"][i % 4].to_string(),
                    ..NewBusiness::default()
                })
                .collect();
            let written = storage.insert_businesses(&rows).await?;
            println!("seeded {written} rows");
        }
        Command::Count => {
            println!("{}", storage.count_businesses().await?);
        }
    }

    Ok(())
}
