use std::path::PathBuf;

use clap::{Parser, Subcommand};
use foundation::{Clock, SystemClock};
use persistence::{FileStorage, StatePersistence};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and manage saved dashboard sessions")]
struct Args {
    /// Directory holding saved snapshots (one `<storage key>.json` per key)
    #[arg(long, global = true, default_value = "data/dashboard")]
    storage_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the state a page load with this query would start from
    Resolve {
        /// Share-link query, with or without the leading `?`
        #[arg(long, default_value = "")]
        query: String,

        /// Write the resolved state back as the saved snapshot
        #[arg(long)]
        save: bool,
    },

    /// Print only the mirrored share query
    Share {
        #[arg(long, default_value = "")]
        query: String,
    },

    /// Remove the saved snapshot
    Reset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = tools::config_from_env();
    let storage = FileStorage::new(&args.storage_dir);

    match args.command {
        Command::Resolve { query, save } => {
            let res = tools::resolve(&config, &query, Box::new(storage), SystemClock.now(), save)?;
            println!("{}", serde_json::to_string_pretty(&res)?);
        }
        Command::Share { query } => {
            let res = tools::resolve(&config, &query, Box::new(storage), SystemClock.now(), false)?;
            println!("{}", res.share_query);
        }
        Command::Reset => {
            let path = storage.path_for(&config.storage_key);
            let mut persistence = StatePersistence::new(Box::new(storage), config.storage_key);
            if persistence.clear()? {
                info!(path = %path.display(), "removed saved state");
            } else {
                info!(path = %path.display(), "no saved state");
            }
        }
    }
    Ok(())
}
