//! Basic analysis example
//!
//! Builds a small synthetic market in memory and analyzes a few symbols
//! concurrently.
//!
//! To run this example:
//! ```bash
//! RUST_LOG=quant_core=debug cargo run --example basic_analysis AAPL MSFT
//! ```

use chrono::{Duration, TimeZone, Utc};
use quant_core::{
    AnalysisOrchestrator, BatchEntry, EngineConfig, Fundamentals, InMemoryProvider, PricePoint,
    TimeSeries,
};
use std::env;
use std::sync::Arc;

fn synthetic_series(base: f64, drift: f64, days: i64) -> anyhow::Result<TimeSeries> {
    let start = Utc
        .with_ymd_and_hms(2024, 1, 2, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("invalid start date"))?;
    let points = (0..days)
        .map(|i| {
            let x = i as f64;
            let close = base * (1.0 + drift).powf(x) * (1.0 + 0.02 * (x / 3.0).sin());
            PricePoint::new(start + Duration::days(i), close, 1_000_000)
        })
        .collect();
    Ok(TimeSeries::new(points)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args: Vec<String> = env::args().skip(1).collect();
    let symbols = if args.is_empty() {
        vec!["AAPL".to_string(), "MSFT".to_string()]
    } else {
        args
    };

    println!("=== Quant Analysis ===\n");

    let provider = InMemoryProvider::new()
        .with_prices("AAPL", synthetic_series(185.0, 0.0008, 252)?)
        .with_fundamentals(
            "AAPL",
            Fundamentals::new(vec![73.4e9, 92.9e9, 111.4e9, 99.6e9])
                .with_beta(1.29)
                .with_shares_outstanding(15.4e9),
        )
        .with_prices("MSFT", synthetic_series(370.0, 0.0006, 252)?)
        .with_fundamentals(
            "MSFT",
            Fundamentals::new(vec![45.2e9, 56.1e9, 65.1e9, 59.5e9])
                .with_beta(0.9)
                .with_shares_outstanding(7.43e9),
        )
        .with_prices("SPY", synthetic_series(475.0, 0.0004, 252)?);

    let config = EngineConfig::builder()
        .simulation_count(2_000)
        .risk_universe(["SPY"])
        .seed(7)
        .build()?;

    println!("Configuration:");
    println!("  - Simulations: {}", config.valuation.simulation_count);
    println!("  - Confidence level: {}", config.risk.confidence_level);
    println!("  - Cache TTL (prices): {:?}\n", config.cache_ttl_prices);

    let caches = Arc::new(config.cache_manager());
    let orchestrator = AnalysisOrchestrator::new(Arc::new(provider), caches, config)?;

    for (symbol, entry) in orchestrator.analyze_many(&symbols).await? {
        match entry {
            BatchEntry::Success(result) => {
                println!("## {symbol}");
                println!("  Price: {:.2}", result.metrics.latest_price);
                if let Some(rsi) = result.metrics.technical.rsi {
                    println!("  RSI(14): {rsi:.1}");
                }
                if let Some(valuation) = &result.valuation {
                    println!(
                        "  DCF value: {:.3e} (95% CI {:.3e} .. {:.3e})",
                        valuation.simulation.mean,
                        valuation.simulation.ci_lower,
                        valuation.simulation.ci_upper
                    );
                    if let Some(verdict) = valuation.verdict {
                        println!("  Verdict: {verdict:?}");
                    }
                }
                if let Some(risk) = &result.risk {
                    println!("  CVaR({}): {:.4}", risk.confidence_level, risk.cvar);
                }
                for (section, reason) in &result.unavailable {
                    println!("  {section} unavailable: {reason}");
                }
                println!();
            }
            BatchEntry::Failure(error) => println!("## {symbol} (Error)\n  {}\n", error.message),
        }
    }

    Ok(())
}
