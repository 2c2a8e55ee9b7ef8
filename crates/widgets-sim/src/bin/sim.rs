#![forbid(unsafe_code)]

use std::env;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use widgets_core::WidgetType;
use widgets_sim::campaign::{self, CampaignConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "widgets-sim: deterministic multi-client widget simulation",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Which widget types to simulate.
    #[arg(long, value_enum, default_value_t = WidgetArg::All, global = true)]
    widget: WidgetArg,

    /// Rounds per seed.
    #[arg(long, default_value_t = 24, global = true)]
    rounds: u64,

    /// Clients present from the start.
    #[arg(long, default_value_t = 4, global = true)]
    clients: usize,

    /// Clients that join mid-run.
    #[arg(long, default_value_t = 1, global = true)]
    late_joiners: usize,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run many seeds and report failures.
    Campaign {
        /// Number of seeds, starting at `--start`.
        #[arg(long, default_value_t = 100)]
        seeds: u64,

        #[arg(long, default_value_t = 0)]
        start: u64,
    },
    /// Re-run one seed and print its trace.
    Replay {
        #[arg(long)]
        seed: u64,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum WidgetArg {
    Poll,
    Todo,
    All,
}

impl WidgetArg {
    fn types(self) -> Vec<WidgetType> {
        match self {
            Self::Poll => vec![WidgetType::Poll],
            Self::Todo => vec![WidgetType::Todo],
            Self::All => WidgetType::ALL.to_vec(),
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let base = CampaignConfig {
        widgets: cli.widget.types(),
        rounds: cli.rounds,
        client_count: cli.clients,
        late_joiners: cli.late_joiners,
        ..CampaignConfig::default()
    };

    match cli.command.unwrap_or(Commands::Campaign {
        seeds: 100,
        start: 0,
    }) {
        Commands::Campaign { seeds, start } => {
            let config = CampaignConfig {
                seed_range: start..start.saturating_add(seeds),
                ..base
            };
            let report = campaign::run_campaign(&config)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "campaign complete: seeds={} passed={} interesting={} rejected={}",
                    report.seeds_run,
                    report.seeds_passed,
                    report.interesting_states_reached,
                    report.events_rejected
                );
                for failure in &report.failures {
                    println!("seed {} ({}):", failure.seed, failure.widget);
                    for violation in &failure.violations {
                        println!("  {violation}");
                    }
                }
            }
            if !report.all_passed() {
                std::process::exit(1);
            }
        }
        Commands::Replay { seed } => {
            let trace = campaign::replay_seed(seed, &base)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&trace.result.trace)?);
            } else {
                for event in &trace.result.trace {
                    println!("round {:>3}: {:?}", event.round, event.kind);
                }
                println!(
                    "seed {seed} ({}): log={} passed={}",
                    trace.result.config.widget,
                    trace.result.log.len(),
                    trace.oracle.passed
                );
                for violation in &trace.oracle.violations {
                    println!("  {violation}");
                }
            }
            if !trace.oracle.passed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("WIDGETS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "widgets=debug,info"
        } else {
            "widgets=info,warn"
        })
    });

    let format = env::var("WIDGETS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry.with(fmt::layer().compact()).init();
        }
    }
}
