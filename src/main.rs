use std::{
    hint::black_box,
    path::PathBuf,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use ecotrack_lib::{
    carbon::budget, CarbonSession, EcotrackConfig, FootprintCalculator, IntensityCache, Sampler,
    SessionReport,
};

#[derive(Debug, Parser)]
#[command(name = "ecotrack")]
#[command(about = "Measure the energy and carbon footprint of a synthetic CPU workload")]
struct Cli {
    #[arg(short = 'c', long, value_name = "PATH", default_value = "ecotrack.json")]
    config: PathBuf,
    /// Grid region code, e.g. FR or US-CA
    #[arg(short = 'r', long)]
    region: Option<String>,
    #[arg(short = 's', long, default_value_t = 10, value_name = "SECONDS")]
    seconds: u64,
    /// Fraction of each 10ms slice spent busy, 0..1
    #[arg(short = 'i', long, default_value_t = 0.7)]
    intensity: f64,
    /// Sampling interval in seconds
    #[arg(long, value_name = "SECONDS")]
    interval: Option<f64>,
    #[arg(long, value_name = "KG")]
    budget_kg: Option<f64>,
    /// Print the session report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    ecotrack_lib::init_logging();
    let cli = Cli::parse();

    let mut config = EcotrackConfig::load(&cli.config)?.apply_env();
    if let Some(region) = cli.region {
        config.region = region;
    }
    if let Some(interval) = cli.interval.filter(|secs| secs.is_finite() && *secs > 0.0) {
        config.sampling_interval_secs = interval;
    }
    if cli.budget_kg.is_some() {
        config.daily_budget_kg = cli.budget_kg;
    }

    let cache = Arc::new(IntensityCache::new(
        config.build_provider(),
        config.cache_ttl(),
    ));
    let calculator = FootprintCalculator::new(config.region.clone(), cache);
    let sampler = Sampler::with_hardware(config.sampler_config());
    let mut session = CarbonSession::new(
        config.session_config("cpu load"),
        sampler,
        calculator,
    );

    let duration = Duration::from_secs(cli.seconds);
    let intensity = cli.intensity.clamp(0.0, 1.0);
    let iterations = session
        .track(async move {
            tokio::task::spawn_blocking(move || burn_cpu(duration, intensity))
                .await
                .context("CPU workload panicked")
        })
        .await?;

    let report = session
        .report()
        .context("session finished without a report")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_report(report, iterations);
    }
    Ok(())
}

/// Busy-loop for `intensity` of every 10ms slice until `duration` elapses.
fn burn_cpu(duration: Duration, intensity: f64) -> u64 {
    let slice = Duration::from_millis(10);
    let busy = slice.mul_f64(intensity);
    let deadline = Instant::now() + duration;
    let mut iterations = 0u64;

    while Instant::now() < deadline {
        let slice_start = Instant::now();
        while slice_start.elapsed() < busy {
            let x = black_box(iterations as f64);
            black_box(x * x + x.sqrt());
            iterations += 1;
        }
        std::thread::sleep(slice.saturating_sub(busy));
    }
    iterations
}

fn print_report(report: &SessionReport, iterations: u64) {
    let summary = &report.summary;
    println!("Session '{}' ({:?})", report.name, report.outcome);
    println!("  platform:       {}", report.system.platform);
    println!("  iterations:     {iterations}");
    println!("  duration:       {:.1}s", summary.duration_seconds);
    println!("  samples:        {}", summary.sample_count);
    println!("  total energy:   {:.6} kWh", summary.energy.total_kwh);
    println!("  avg power:      {:.1} W", summary.power.avg_total_watts);
    println!("  peak power:     {:.1} W", summary.power.peak_total_watts);
    println!("  avg CPU:        {:.1}%", summary.utilization.avg_cpu_percent);
    println!("  {}", report.footprint);

    if let Some(cost) = report.footprint.cost_estimate_usd() {
        println!("  cost estimate:  ${cost:.6}");
    }

    let equivalents = report.footprint.equivalents();
    if report.footprint.total_co2_kg() > 0.0 {
        println!("Equivalent to:");
        for (kind, text) in &equivalents {
            println!("  {kind}: {text}");
        }
    }

    let budget = report
        .budget
        .unwrap_or_else(|| budget::status(report.footprint.total_co2_kg(), None));
    println!(
        "Budget: {:.6}kg of {:.3}kg ({:.4}%){}",
        budget.used_kg,
        budget.daily_budget_kg,
        budget.percentage_used,
        if budget.exceeded { " EXCEEDED" } else { "" }
    );
}
