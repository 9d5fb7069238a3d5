use anyhow::{Context, Result};
use cache_sim::config::Config;
use cache_sim::run_simulation;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn init_msg() {
    println!("cache simulation");
}

fn main() -> Result<()> {
    init_logging();
    init_msg();
    let config = Config::parse();
    config.display();
    println!();
    run_simulation(&config)
        .with_context(|| format!("simulation over {} trace(s) failed", config.traces.len()))
}
