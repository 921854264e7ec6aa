#![cfg_attr(test, allow(clippy::disallowed_methods))]
// Forbid unwrap() in production code to prevent panics from corrupt data.
// Test code is allowed to use unwrap() for convenience.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
use pagetree::config::TreeConfig;
use pagetree::storage::FileStorage;
use pagetree::{BTree, BTreeError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: pagetree put <key> <value> | get <key> | stats";

/// A single command-line request.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Put { key: i32, value: String },
    Get { key: i32 },
    Stats,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self, String> {
        let parse_key = |raw: &str| {
            raw.parse::<i32>()
                .map_err(|_| format!("'{raw}' is not a valid i32 key"))
        };

        match args {
            [cmd, key, value] if cmd == "put" => Ok(Self::Put {
                key: parse_key(key)?,
                value: value.clone(),
            }),
            [cmd, key] if cmd == "get" => Ok(Self::Get {
                key: parse_key(key)?,
            }),
            [cmd] if cmd == "stats" => Ok(Self::Stats),
            _ => Err(USAGE.to_string()),
        }
    }
}

/// Run `command` against the tree. Returns whether the command found what
/// it was asked for.
fn run(config: &TreeConfig, command: &Command) -> Result<bool, BTreeError> {
    let storage = FileStorage::open(&config.path)?;
    let mut tree = BTree::new(storage)?;

    match command {
        Command::Put { key, value } => {
            tree.put(*key, value)?;
            if config.sync {
                tree.sync()?;
            }
            tracing::debug!(key, count = tree.len(), "put");
            Ok(true)
        }
        Command::Get { key } => match tree.get(*key)? {
            Some(value) => {
                println!("{value}");
                Ok(true)
            }
            None => {
                tracing::debug!(key, "key not found");
                Ok(false)
            }
        },
        Command::Stats => {
            println!("count: {}", tree.len());
            println!("height: {}", tree.height());
            println!("root_offset: {}", tree.root_offset());
            Ok(true)
        }
    }
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagetree=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration from environment variables
    let config = match TreeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(2);
        }
    };

    tracing::info!(path = %config.path.display(), ?command, "running");

    match run(&config, &command) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!("Command failed: {e}");
            std::process::exit(1);
        }
    }
}
