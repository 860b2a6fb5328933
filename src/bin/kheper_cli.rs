use anyhow::{anyhow, Context, Result};
use kheper::{
    about,
    config::{PipelineConfig, DEFAULT_CONFIG_PATH},
    pipeline::{self, Stage},
};
use serde::Serialize;
use std::env;

fn usage() {
    eprintln!(
        "Usage:\n  \
  kheper_cli --version\n  \
  kheper_cli [--config PATH] [--log-level LEVEL] show-config\n  \
  kheper_cli [--config PATH] [--log-level LEVEL] capabilities\n  \
  kheper_cli [--config PATH] [--log-level LEVEL] download\n  \
  kheper_cli [--config PATH] [--log-level LEVEL] decompress\n  \
  kheper_cli [--config PATH] [--log-level LEVEL] process-cell-painting\n  \
  kheper_cli [--config PATH] [--log-level LEVEL] process-expression\n  \
  kheper_cli [--config PATH] [--log-level LEVEL] run\n\n  \
  Config defaults to '{DEFAULT_CONFIG_PATH}' and falls back to built-in defaults when absent.\n  \
  LEVEL is one of error|warn|info|debug|trace (default: RUST_LOG, else info)"
    );
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text =
        serde_json::to_string_pretty(value).context("Could not serialize JSON output")?;
    println!("{text}");
    Ok(())
}

struct GlobalArgs {
    config_path: String,
    log_level: Option<String>,
    cmd_idx: usize,
}

fn parse_global_args(args: &[String]) -> Result<GlobalArgs> {
    let mut global = GlobalArgs {
        config_path: DEFAULT_CONFIG_PATH.to_string(),
        log_level: None,
        cmd_idx: 1,
    };
    while global.cmd_idx < args.len() {
        let flag = args[global.cmd_idx].as_str();
        let slot = match flag {
            "--config" => &mut global.config_path,
            "--log-level" => global.log_level.insert(String::new()),
            _ => break,
        };
        let value = args
            .get(global.cmd_idx + 1)
            .ok_or_else(|| anyhow!("Missing value for {flag}"))?;
        *slot = value.clone();
        global.cmd_idx += 2;
    }
    Ok(global)
}

fn init_logging(level: Option<&str>) {
    let mut builder = match level {
        Some(level) => {
            let filter = level.parse::<log::LevelFilter>().unwrap_or_else(|_| {
                eprintln!("Warning: Invalid log level '{level}' provided. Defaulting to Info.");
                log::LevelFilter::Info
            });
            let mut builder = env_logger::Builder::new();
            builder.filter_level(filter);
            builder
        }
        None => env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")),
    };
    // stdout carries the JSON report
    builder.target(env_logger::Target::Stderr).init();
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage();
        return Err(anyhow!("Missing command"));
    }
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{}", about::version_cli_text());
        return Ok(());
    }

    let global = parse_global_args(&args)?;
    let Some(command) = args.get(global.cmd_idx) else {
        usage();
        return Err(anyhow!("Missing command"));
    };
    if let Some(extra) = args.get(global.cmd_idx + 1) {
        usage();
        return Err(anyhow!("Unexpected argument '{extra}' after {command}"));
    }
    init_logging(global.log_level.as_deref());

    let config = PipelineConfig::load_or_default(&global.config_path)
        .with_context(|| format!("Could not load configuration from '{}'", global.config_path))?;

    match command.as_str() {
        "show-config" => print_json(&config),
        "capabilities" => print_json(&pipeline::capabilities()),
        "run" => {
            let reports = pipeline::run_stages(&Stage::PROCESSING, &config)?;
            print_json(&reports)
        }
        name => match Stage::from_name(name) {
            Some(stage) => {
                let report = pipeline::apply(stage, &config)?;
                print_json(&report)
            }
            None => {
                usage();
                Err(anyhow!("Unknown command '{command}'"))
            }
        },
    }
}
