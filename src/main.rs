//! StepGraph CLI Entry Point
//!
//! Runs the bundled demonstration flows.
//!
//! # Usage
//!
//! ```bash
//! # Run a demo
//! stepgraph branch
//!
//! # With engine settings from a YAML file
//! stepgraph retry --config engine.yaml
//!
//! # Cap concurrent items in the parallel batch demo
//! stepgraph parallel --parallel 4
//! ```

mod demos;

use std::env;
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info};

use stepgraph::monitoring::ExecutionTimeline;
use stepgraph::workflow::{load_config, EngineConfig};
use stepgraph::{APP_NAME, VERSION};

use demos::{run_demo, DemoContext, DEMOS};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    demo: Option<String>,
    config_path: Option<String>,
    max_concurrency: Option<usize>,
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("Graph-Based Step Orchestration");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: stepgraph [OPTIONS] <DEMO>");
    println!();
    println!("Demos:");
    for (name, description) in DEMOS {
        println!("  {:<10} {}", name, description);
    }
    println!();
    println!("Options:");
    println!("  --config PATH       Load engine settings from a YAML file");
    println!("  --parallel N        Maximum concurrent items in parallel batches");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  stepgraph loop");
    println!("  stepgraph retry --config engine.yaml");
    println!("  stepgraph parallel --parallel 2 --verbose");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--config" => {
                i += 1;
                if i >= args.len() {
                    return Err("--config requires a path argument".to_string());
                }
                config.config_path = Some(args[i].clone());
            }
            "--parallel" => {
                i += 1;
                if i >= args.len() {
                    return Err("--parallel requires a number argument".to_string());
                }
                let limit: usize = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid parallel value: {}", args[i]))?;
                if limit == 0 {
                    return Err("--parallel must be at least 1".to_string());
                }
                config.max_concurrency = Some(limit);
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.demo.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                if !DEMOS.iter().any(|(name, _)| *name == arg.as_str()) {
                    return Err(format!("Unknown demo: {}", arg));
                }
                config.demo = Some(arg.clone());
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Loads engine settings and applies command-line overrides.
fn engine_config(config: &Config) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut engine = match &config.config_path {
        Some(path) => {
            info!("Loading engine config: {}", path);
            load_config(path).map_err(|e| {
                error!("Failed to load config: {}", e);
                format!("Could not load config from '{}': {}", path, e)
            })?
        }
        None => EngineConfig::default(),
    };

    if config.max_concurrency.is_some() {
        engine.max_concurrency = config.max_concurrency;
    }

    Ok(engine)
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let Some(demo) = config.demo.as_deref() else {
        print_usage();
        return Err("No demo selected".into());
    };

    let mut ctx = DemoContext {
        config: engine_config(&config)?,
        timeline: ExecutionTimeline::new(),
    };
    info!(
        "Engine: {} attempt(s), {:?} edges, concurrency {}",
        ctx.config.retry.max_attempts,
        ctx.config.edges,
        ctx.config
            .max_concurrency
            .map_or_else(|| "unbounded".to_string(), |n| n.to_string())
    );

    println!("{} {}", "Running demo:".cyan(), demo.bold());
    let store = run_demo(demo, &mut ctx)?;

    println!();
    println!("{}", "Shared store:".cyan());
    println!("{}", serde_json::to_string_pretty(&store)?);

    println!();
    println!("{}", ctx.timeline.gantt_chart());

    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
