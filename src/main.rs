// Quota Governor - Command Line Entry Point
//
// Inspect the quota catalog, plan request pacing for a tier, and drive a
// governor through a burst of admissions to watch it pace them.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quota_governor::governor::{
    Endpoint, GovernorConfig, QuotaCatalog, QuotaScope, RateGovernor, Tier,
};
use quota_governor::metrics;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Quota Governor: client-side pacing for quota-limited APIs
#[derive(Parser, Debug)]
#[command(name = "quota-governor")]
#[command(version)]
#[command(about = "Adaptive client-side rate governor for quota-limited APIs", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the published limits for one or all tiers
    Catalog {
        /// Tier to show (free, basic, pro, enterprise)
        #[arg(long)]
        tier: Option<String>,
    },
    /// Show effective ceilings and recommended intervals per endpoint
    Plan {
        /// Tier override
        #[arg(long)]
        tier: Option<String>,

        /// Safety factor override (0 < x <= 1)
        #[arg(long)]
        safety_factor: Option<f64>,
    },
    /// Push a burst of admissions through a governor and print its status
    Simulate {
        /// Endpoint to admit against
        #[arg(long, default_value = "get_users_tweets")]
        endpoint: String,

        /// Number of admissions
        #[arg(long, default_value_t = 1)]
        calls: u32,

        /// Tier override
        #[arg(long)]
        tier: Option<String>,

        /// Safety factor override (0 < x <= 1)
        #[arg(long)]
        safety_factor: Option<f64>,

        /// Print status as JSON instead of the text summary
        #[arg(long)]
        json: bool,

        /// Also print Prometheus metrics
        #[arg(long)]
        metrics: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(filter.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Catalog { tier } => {
            let tiers = match tier {
                Some(t) => vec![t.parse::<Tier>()?],
                None => Tier::ALL.to_vec(),
            };
            print_catalog(&tiers);
        }
        Commands::Plan {
            tier,
            safety_factor,
        } => {
            let config = load_config(args.config.as_ref(), tier, safety_factor)?;
            let governor = RateGovernor::new(config)?;
            print_plan(&governor);
        }
        Commands::Simulate {
            endpoint,
            calls,
            tier,
            safety_factor,
            json,
            metrics: show_metrics,
        } => {
            let config = load_config(args.config.as_ref(), tier, safety_factor)?;
            let governor = RateGovernor::new(config)?;
            simulate(&governor, Endpoint::from(endpoint), calls).await;

            let status = governor.status();
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status).context("Failed to encode status")?
                );
            } else {
                print!("{}", status.render());
            }
            if show_metrics {
                print!("{}", metrics::gather_metrics()?);
            }
        }
    }

    Ok(())
}

/// Resolve configuration: file (if given) or environment, then CLI overrides
fn load_config(
    path: Option<&PathBuf>,
    tier: Option<String>,
    safety_factor: Option<f64>,
) -> Result<GovernorConfig> {
    let mut config = match path {
        Some(path) => GovernorConfig::load_from_path(path)?,
        None => GovernorConfig::from_env().context("Invalid QUOTA_GOVERNOR_* environment")?,
    };

    if let Some(tier) = tier {
        config.tier = tier.parse()?;
    }
    if let Some(factor) = safety_factor {
        config.safety_factor = factor;
    }
    config.validate()?;
    Ok(config)
}

fn print_catalog(tiers: &[Tier]) {
    for tier in tiers {
        println!("{}", tier);
        let rows = QuotaCatalog::rows(*tier);
        if rows.is_empty() {
            println!("  (no published limits; every endpoint uses the 1 per 15 minute fallback)");
        }
        for (endpoint, limit) in rows {
            let scope = match limit.scope {
                QuotaScope::PerUser => "per user",
                QuotaScope::PerApp => "per app",
            };
            println!(
                "  {:<18} {:>5} per {:>5} min  ({})",
                endpoint.name(),
                limit.requests_per_window,
                limit.window.as_secs() / 60,
                scope
            );
        }
    }
}

fn print_plan(governor: &RateGovernor) {
    let config = governor.config();
    println!(
        "Tier {} at {:.0}% safety factor",
        config.tier,
        config.safety_factor * 100.0
    );
    for endpoint in Endpoint::KNOWN.iter() {
        let limit = governor.limit_for(endpoint);
        println!(
            "  {:<18} max {:>5} per {:>5} min, recommended interval {:.1}s",
            endpoint.name(),
            governor.max_admitted(endpoint),
            limit.window.as_secs() / 60,
            governor.recommended_interval(endpoint.clone()).as_secs_f64()
        );
    }
}

async fn simulate(governor: &RateGovernor, endpoint: Endpoint, calls: u32) {
    info!(endpoint = %endpoint, calls, "Starting simulated burst");
    for i in 1..=calls {
        let admission = governor.admit(endpoint.clone()).await;
        info!(
            "[{}/{}] admitted to {} after {:.1}s ({}/{} in window)",
            i,
            calls,
            admission.endpoint,
            admission.waited.as_secs_f64(),
            admission.occupancy,
            admission.max_admitted
        );
    }
}
