//! worldsync - run block-world scenarios against the reference server

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use worldsync::world_data::SUPPORTED_VERSIONS;
use worldsync::{run_entry, world_runner, CatalogEntry, HarnessSettings};

/// Scenario harness for block-world protocol servers
#[derive(Parser, Debug)]
#[command(name = "worldsync", version, about)]
struct Args {
    /// Config file (defaults to worldsync.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List catalog entries and supported versions
    List,
    /// Run catalog entries
    Run {
        /// Protocol version; every supported version when omitted
        #[arg(long = "protocol")]
        version: Option<String>,

        /// Entry name; the whole catalog when omitted
        #[arg(short, long)]
        scenario: Vec<String>,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "worldsync=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json);

    let settings = match &args.config {
        Some(path) => HarnessSettings::load_from(path)?,
        None => HarnessSettings::load()?,
    };

    match args.command {
        Command::List => {
            for entry in CatalogEntry::ALL {
                println!("{:<48} {:?}", entry.name(), entry.group());
            }
            println!("versions: {}", SUPPORTED_VERSIONS.join(", "));
            Ok(())
        }
        Command::Run { version, scenario } => {
            let versions: Vec<String> = match version {
                Some(v) => vec![v],
                None => SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
            };
            let entries = if scenario.is_empty() {
                CatalogEntry::ALL.to_vec()
            } else {
                scenario
                    .iter()
                    .map(|name| {
                        CatalogEntry::from_name(name)
                            .ok_or_else(|| anyhow::anyhow!("unknown scenario: {}", name))
                    })
                    .collect::<Result<Vec<_>>>()?
            };

            // Scenarios share one event loop, like the test suite
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let runner = world_runner(settings);

            let failed = runtime.block_on(async {
                let mut failed = 0;
                for version in &versions {
                    for entry in &entries {
                        match run_entry(&runner, *entry, version).await {
                            Ok(()) => info!("{} {} ok", version, entry),
                            Err(e) => {
                                error!("{} {} failed: {}", version, entry, e);
                                failed += 1;
                            }
                        }
                    }
                }
                failed
            });

            if failed > 0 {
                bail!("{} scenario runs failed", failed);
            }
            info!("{} scenario runs passed", versions.len() * entries.len());
            Ok(())
        }
    }
}
