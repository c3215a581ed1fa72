//! 🚀 pgshift-cli: the front door, the bouncer, the maitre d' of pgshift.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that parses flags, sets up logging,
//! loads config, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, CellAlignment, Table, presets::NOTHING};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// 🔧 The config file we look for when nobody names one.
const DEFAULT_CONFIG_FILE: &str = "pgshift.toml";

/// 🐘➡️🔴 Replicate Postgres tables into Redshift through S3.
#[derive(Parser, Debug)]
#[command(name = "pgshift", version, about)]
struct Cli {
    /// TOML config file. Defaults to ./pgshift.toml if it exists, otherwise env vars only.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export every selected table and swap it into the warehouse (the default).
    Run {
        /// Only replicate this table. Repeatable.
        #[arg(long = "table")]
        tables: Vec<String>,
    },
    /// List objects in the export bucket.
    ListObjects {
        #[arg(long)]
        prefix: Option<String>,
        #[arg(long, default_value_t = pgshift::DEFAULT_LIST_MAX_KEYS)]
        max_keys: i32,
    },
}

/// 🔍 An explicit --config must exist. The default one may be absent.
fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    match explicit {
        Some(path) => {
            let exists = path.try_exists().context(format!(
                "💀 Couldn't check whether the configuration file exists. Was checking here: '{}'",
                path.display()
            ))?;
            if !exists {
                anyhow::bail!(
                    "💀 Configuration file '{}' does not exist. If it's a relative path, check your cwd, \
                     or use an absolute path to be absolutely certain.",
                    path.display()
                );
            }
            Ok(Some(path.to_path_buf()))
        }
        None => {
            let the_default = Path::new(DEFAULT_CONFIG_FILE);
            // -- 💤 no file is fine. env vars can carry the whole config.
            Ok(the_default
                .try_exists()
                .unwrap_or(false)
                .then(|| the_default.to_path_buf()))
        }
    }
}

fn render_objects(objects: &[pgshift::common::ObjectSummary]) -> String {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_header(vec!["key", "size"]);
    for object in objects {
        table.add_row(vec![
            Cell::new(&object.key),
            Cell::new(object.size).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

async fn execute(cli: Cli) -> Result<()> {
    let the_config_path = resolve_config_path(cli.config.as_deref())?;

    // 🔧 Load the config: the moment we find out if the TOML is valid
    // or if someone put a tab where a space should be (looking at you, Kevin)
    let app_config = pgshift::app_config::load_config(the_config_path.as_deref())
        .context("💀 In pgshift-cli, main, we couldn't load the configuration. Check the file and the PGSHIFT_* / legacy env vars.")?;

    match cli.command.unwrap_or(Command::Run { tables: Vec::new() }) {
        Command::Run { tables } => {
            // 🚀 SEND IT. No take-backs.
            let the_report = pgshift::run(app_config, &tables).await?;
            println!("{}", the_report.render());
            info!("✅ replicated {} table(s)", the_report.tables.len());
        }
        Command::ListObjects { prefix, max_keys } => {
            let the_objects = pgshift::list_objects(&app_config, prefix.as_deref(), max_keys).await?;
            println!("{}", render_objects(&the_objects));
        }
    }
    Ok(())
}

/// 🚀 main(): init tracing, parse args, run, and on failure print the whole onion
/// of causes before exiting 1.
#[tokio::main]
async fn main() {
    // 📡 println! debugging is a lifestyle choice we're trying to move past
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(err) = execute(cli).await {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one tear-jerking layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("dispatch failure")
                || cause_str.contains("error connecting to server")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like Postgres, Redshift or S3 isn't reachable. \
                 Double-check hosts, ports, security groups, and that the cluster is awake. ☕"
            );
        }

        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }
}
