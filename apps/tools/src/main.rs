use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use storage::{normalize_database_url, HandoffStore, Storage};

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/presenter.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored handoff keys.
    List,
    /// Print one entry, pretty-printed when it is JSON.
    Show { key: String },
    Remove { key: String },
    /// Remove every entry, including any stored session.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&normalize_database_url(&cli.database_url)).await?;
    storage.health_check().await?;

    match cli.command {
        Command::List => {
            let entries = storage.entries().await?;
            if entries.is_empty() {
                println!("handoff store is empty");
            }
            for entry in entries {
                println!(
                    "{}\t{} bytes\t{}",
                    entry.key,
                    entry.payload.len(),
                    entry.stored_at.to_rfc3339()
                );
            }
        }
        Command::Show { key } => {
            let Some(payload) = storage.get(&key).await? else {
                bail!("no handoff entry named {key}");
            };
            match serde_json::from_str::<serde_json::Value>(&payload) {
                Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => println!("{payload}"),
            }
        }
        Command::Remove { key } => {
            if storage.remove(&key).await? {
                println!("removed {key}");
            } else {
                println!("no handoff entry named {key}");
            }
        }
        Command::Clear => {
            let removed = storage.clear().await?;
            println!("removed {removed} entries");
        }
    }

    Ok(())
}
