use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::{DirectoryController, HttpDirectoryGateway, LoadOutcome, ScrollProbe};
use shared::domain::{BusinessField, BusinessId};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long)]
    server_url: String,
    #[arg(long, default_value_t = 50)]
    page_size: i64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Page through the directory, printing each batch as it loads.
    Browse {
        #[arg(long)]
        max_pages: Option<usize>,
    },
    /// Bulk-set one field on an explicit list of row ids.
    Set {
        #[arg(long, value_delimiter = ',')]
        ids: Vec<i64>,
        field: BusinessField,
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();

    let gateway = Arc::new(HttpDirectoryGateway::new(cli.server_url));
    let mut controller = DirectoryController::new(gateway, cli.page_size);

    match cli.command {
        Command::Browse { max_pages } => {
            // The terminal stand-in for the scroll trigger: after each page
            // the "viewport" sits at the loaded tail.
            let mut probe = ScrollProbe::new(5, Duration::from_millis(0));
            let mut pages = 0usize;
            loop {
                if let Some(limit) = max_pages {
                    if pages >= limit {
                        break;
                    }
                }
                let viewport_top = controller.loaded_count().saturating_sub(20);
                if !probe.near_end(viewport_top, 20, controller.loaded_count()) {
                    break;
                }
                match controller.load_more().await {
                    LoadOutcome::Appended(0) => break,
                    LoadOutcome::Appended(n) => {
                        pages += 1;
                        let start = controller.loaded_count() - n;
                        for row in &controller.rows()[start..] {
                            println!(
                                "{:>6}  {:<30}  {:<20}  {:<2}",
                                row.id.0, row.name, row.city, row.state
                            );
                        }
                        println!(
                            "-- loaded {} / {} rows",
                            controller.loaded_count(),
                            controller.total_count()
                        );
                    }
                    LoadOutcome::InFlight => continue,
                    LoadOutcome::Exhausted => break,
                }
            }
            println!(
                "done: {} rows loaded of {} total",
                controller.loaded_count(),
                controller.total_count()
            );
        }
        Command::Set { ids, field, value } => {
            for id in ids {
                controller.select(BusinessId(id));
            }
            let updated = controller.bulk_update(field, &value).await?;
            println!("updated {updated} rows: {field} = {value:?}");
        }
    }

    Ok(())
}
