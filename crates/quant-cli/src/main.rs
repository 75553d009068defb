//! Command-line interface for the quant analytics engine

use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use quant_core::{
    AnalysisOrchestrator, AnalysisResult, BatchEntry, EngineConfig, ExecutionStrategy,
    InMemoryProvider, MarketDataProvider,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "quant-cli")]
#[command(about = "DCF valuation, CVaR risk and technical analysis from market data", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze one or more symbols
    Analyze {
        /// Ticker symbols (at most the configured batch size)
        #[arg(required = true)]
        symbols: Vec<String>,

        /// JSON market data fixture with `prices` and `fundamentals` maps
        #[arg(short, long)]
        data: PathBuf,

        /// Print the full JSON report instead of a table
        #[arg(long)]
        json: bool,

        /// Fixed Monte Carlo seed
        #[arg(long)]
        seed: Option<u64>,

        /// Number of Monte Carlo trials
        #[arg(long)]
        simulations: Option<usize>,

        /// Run simulations on all compute threads
        #[arg(long)]
        parallel: bool,

        /// Peer symbols added to the risk matrix
        #[arg(long, value_delimiter = ',')]
        universe: Vec<String>,
    },
    /// Print the effective configuration after environment overrides
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        quant_utils::init_tracing_json("info");
    } else {
        quant_utils::init_tracing();
    }

    let mut config = EngineConfig::default().with_env()?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Analyze {
            symbols,
            data,
            json,
            seed,
            simulations,
            parallel,
            universe,
        } => {
            if let Some(seed) = seed {
                config.seed = Some(seed);
            }
            if let Some(count) = simulations {
                config.valuation.simulation_count = count;
            }
            if parallel {
                config.valuation.strategy = ExecutionStrategy::Parallel;
            }
            if !universe.is_empty() {
                config.risk_universe = universe;
            }
            config.validate()?;

            let provider = InMemoryProvider::from_path(&data)
                .with_context(|| format!("loading market data from {}", data.display()))?;
            info!("Using {} provider with {} symbols", provider.name(), provider.symbols().len());

            let caches = Arc::new(config.cache_manager());
            let orchestrator = AnalysisOrchestrator::new(Arc::new(provider), caches, config)?;
            let results = orchestrator.analyze_many(&symbols).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_tables(&results);
            }
        }
    }

    Ok(())
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.precision$}"))
}

fn summary_row(symbol: &str, result: &AnalysisResult) -> Vec<String> {
    let technical = &result.metrics.technical;
    let valuation = result.valuation.as_ref();
    vec![
        symbol.to_string(),
        format!("{:.2}", result.metrics.latest_price),
        fmt_opt(technical.sma_50, 2),
        fmt_opt(technical.sma_200, 2),
        fmt_opt(technical.rsi, 1),
        fmt_opt(technical.volatility.map(|v| v * 100.0), 1),
        fmt_opt(valuation.and_then(|v| v.fair_value_per_share), 2),
        valuation
            .and_then(|v| v.verdict)
            .map_or_else(|| "-".to_string(), |v| format!("{v:?}")),
        fmt_opt(result.risk.as_ref().map(|r| r.cvar * 100.0), 2),
    ]
}

fn print_tables(results: &BTreeMap<String, BatchEntry>) {
    let mut summary = Table::new();
    summary
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Symbol", "Price", "SMA 50", "SMA 200", "RSI", "Vol %", "Fair value", "Verdict",
            "CVaR %",
        ]);

    let mut issues = Table::new();
    issues
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Symbol", "Section", "Reason"]);
    let mut has_issues = false;

    for (symbol, entry) in results {
        match entry {
            BatchEntry::Success(result) => {
                summary.add_row(summary_row(symbol, result));
                for (section, reason) in &result.unavailable {
                    issues.add_row(vec![symbol.clone(), section.clone(), reason.clone()]);
                    has_issues = true;
                }
            }
            BatchEntry::Failure(error) => {
                issues.add_row(vec![symbol.clone(), "analysis".to_string(), error.message.clone()]);
                has_issues = true;
            }
        }
    }

    println!("{summary}");
    if has_issues {
        println!("{issues}");
    }
}
