//! Pricing Resolver
//!
//! Command-line front end to the pricing engine. Resolves prices against the
//! live catalog, or offline against a catalog fixture file, and prints the
//! results as JSON.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use core_config::{Environment, FromEnv};
use domain_pricing::{
    BillingModel, InMemoryCatalog, OperatingSystem, PaymentOption, PlanType, PricingConfig,
    PricingService, Term,
};
use eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

mod commands;

#[derive(Parser)]
#[command(name = "pricing-resolver")]
#[command(about = "Resolve cloud prices with caching, retries and regional fallbacks")]
struct Cli {
    /// Answer queries from a catalog fixture file instead of the live catalog
    #[arg(long, global = true)]
    catalog_file: Option<PathBuf>,

    /// Skip the shared cache tier even if REDIS_URL is set
    #[arg(long, global = true)]
    no_shared_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price one instance type
    Instance {
        instance_type: String,
        region: String,

        #[arg(long, default_value = "linux")]
        os: OperatingSystem,

        #[arg(short, long, default_value = "on-demand")]
        billing: BillingModel,

        /// Commitment term for reserved / commitment-plan billing
        #[arg(long, default_value = "1yr")]
        term: Term,

        #[arg(long, default_value = "no-upfront")]
        payment: PaymentOption,
    },

    /// Price a block-storage volume type
    Storage {
        volume_type: String,
        region: String,

        /// Also report the monthly cost of a volume this size
        #[arg(long)]
        size_gb: Option<f64>,
    },

    /// Price a commitment plan and its savings over on-demand
    Commitment {
        instance_type: String,
        region: String,

        #[arg(long, default_value = "standard-reserved")]
        plan: PlanType,

        #[arg(long, default_value = "1yr")]
        term: Term,

        #[arg(long, default_value = "no-upfront")]
        payment: PaymentOption,

        #[arg(long, default_value = "linux")]
        os: OperatingSystem,
    },

    /// Price many instance types in one region
    Batch {
        region: String,

        /// Instance types, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        instance_types: Vec<String>,

        #[arg(long, default_value = "linux")]
        os: OperatingSystem,
    },

    /// Find the cheapest available substitute for an instance type
    Alternative {
        instance_type: String,
        region: String,

        #[arg(long, default_value = "linux")]
        os: OperatingSystem,
    },

    /// Check whether an instance type is offered in a region
    Available { instance_type: String, region: String },

    /// Drop cached quotes matching a glob pattern
    Invalidate {
        #[arg(default_value = "*")]
        pattern: String,
    },
}

async fn build_service(cli: &Cli, config: &PricingConfig) -> Result<PricingService> {
    let mut config = config.clone();
    if cli.no_shared_cache {
        config.cache.redis_url = None;
    }

    match &cli.catalog_file {
        Some(path) => {
            info!(path = %path.display(), "Using catalog fixture");
            let catalog = InMemoryCatalog::load(path).await?;
            let shared = PricingService::shared_tier(&config).await;
            let endpoint = path.display().to_string();
            Ok(PricingService::build(&config, &endpoint, Arc::new(catalog), shared))
        }
        None => {
            info!(url = %config.catalog.url, "Using live catalog");
            Ok(PricingService::connect(&config).await?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = PricingConfig::from_env()?;
    let environment = Environment::from_env();
    init_tracing(&environment);

    let cli = Cli::parse();
    let service = build_service(&cli, &config).await?;

    let output = commands::run(&service, cli.command).await;

    let stats = service.cache_stats();
    info!(
        hits = stats.hits,
        misses = stats.misses,
        evictions = stats.evictions,
        hit_rate_percent = stats.hit_rate_percent,
        circuit = %service.circuit_state(),
        "Cache statistics"
    );

    println!("{}", serde_json::to_string_pretty(&output?)?);
    Ok(())
}
