mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::item::ItemSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "deck",
    about = "No-repeat item rotation with a daily pick per requester",
    version,
    propagate_version = true
)]
struct Cli {
    /// Deck root (default: auto-detect from .deck/)
    #[arg(long, global = true, env = "DECK_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a deck in the current directory
    Init,

    /// Register new files from the library folder
    Sync,

    /// Show how many items are in the pool
    Count,

    /// Hand out the next item of the cycle
    Next,

    /// Show a requester's item of the day
    Daily {
        /// Requester id (e.g. chat user id)
        requester: i64,
        /// Day to use instead of today (YYYY-MM-DD)
        #[arg(long)]
        date: Option<String>,
    },

    /// Reshuffle the whole order (admin)
    Reshuffle {
        /// Acting user name, checked against the admin list
        #[arg(long = "as")]
        user: String,
    },

    /// Manage items
    Item {
        #[command(subcommand)]
        subcommand: ItemSubcommand,
    },

    /// Allow only admins to add items
    Lock {
        #[arg(long = "as")]
        user: String,
    },

    /// Allow everyone to add items
    Unlock {
        #[arg(long = "as")]
        user: String,
    },

    /// Show order, cursor and pins
    State,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Sync => cmd::sync::run(&root, cli.json),
        Commands::Count => cmd::count::run(&root, cli.json),
        Commands::Next => cmd::next::run(&root, cli.json),
        Commands::Daily { requester, date } => {
            cmd::daily::run(&root, requester, date.as_deref(), cli.json)
        }
        Commands::Reshuffle { user } => cmd::reshuffle::run(&root, &user, cli.json),
        Commands::Item { subcommand } => cmd::item::run(&root, subcommand, cli.json),
        Commands::Lock { user } => cmd::access::run(&root, &user, false, cli.json),
        Commands::Unlock { user } => cmd::access::run(&root, &user, true, cli.json),
        Commands::State => cmd::state::run(&root, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
