//! stepsim CLI
//!
//! Run simulation scenarios on the stepsim engine.

use std::path::PathBuf;

use clap::Parser;
use stepsim_sim::scenarios::ScenarioId;
use stepsim_sim::{HarnessError, ScenarioResult, ScenarioRunner, SimConfig};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

/// stepsim scenario runner
#[derive(Parser, Debug)]
#[command(name = "stepsim")]
#[command(about = "Run multi-agent simulation scenarios on the stepsim engine", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of agents
    #[arg(short, long)]
    agents: Option<usize>,

    /// Scenario to run (ping_pong, gossip, heartbeat, partition, lossy, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to run
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum logical duration in steps
    #[arg(short, long)]
    duration: Option<u64>,

    /// Executor width (0 = number of CPUs)
    #[arg(short, long)]
    threads: Option<usize>,

    /// JSON file with a base SimConfig
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,
}

fn base_config(args: &Args) -> Result<SimConfig, HarnessError> {
    let mut config = match &args.config {
        Some(path) => SimConfig::from_json_file(path)?,
        None => SimConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(agents) = args.agents {
        config.num_agents = agents;
    }
    if let Some(duration) = args.duration {
        config.max_duration = duration;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    if config.seed == 0 {
        config.seed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1);
    }

    config.validate()?;
    Ok(config)
}

fn parse_scenarios(name: &str) -> Result<Vec<ScenarioId>, HarnessError> {
    if name == "all" {
        Ok(ScenarioId::all())
    } else {
        Ok(vec![name.parse()?])
    }
}

fn fail(e: HarnessError) -> ! {
    eprintln!("Error: {}", e);
    if let HarnessError::UnknownScenario(_) = e {
        let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
        eprintln!("Available scenarios: {}, all", names.join(", "));
    }
    std::process::exit(e.exit_code());
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let base = base_config(&args).unwrap_or_else(|e| fail(e));
    let scenarios = parse_scenarios(&args.scenario).unwrap_or_else(|e| fail(e));

    if !args.json {
        info!("stepsim v{}", env!("CARGO_PKG_VERSION"));
        info!(
            "agents={} duration={} threads={}",
            base.num_agents, base.max_duration, base.threads
        );
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut failed_count = 0;

    for seed_offset in 0..args.seeds {
        let seed = base.seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::from_config(SimConfig {
            seed,
            ..base.clone()
        });

        for scenario in &scenarios {
            let result = runner.run(*scenario);

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED at t={}", scenario.name(), seed, result.final_time);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            if !result.passed {
                failed_count += 1;
            }
            all_results.push(result);
        }
    }

    let total = all_results.len();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "steps": r.steps,
                    "final_time": r.final_time,
                    "messages_sent": r.metrics.messages_sent,
                    "messages_delivered": r.metrics.messages_delivered,
                    "messages_dropped": r.metrics.messages_lost + r.metrics.messages_partitioned,
                    "timeouts": r.metrics.timeouts,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(out) => println!("{}", out),
            Err(e) => eprintln!("Failed to encode summary: {}", e),
        }
    } else if failed_count == 0 {
        info!("✅ All {} scenario runs passed!", total);
    } else {
        error!("❌ {}/{} scenario runs failed!", failed_count, total);
        for result in all_results.iter().filter(|r| !r.passed) {
            error!(
                "  - {} seed={}: {}",
                result.scenario.name(),
                result.seed,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
