use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mcp_smoke_core::{harness, HarnessConfig};

#[derive(Parser)]
#[command(
    name = "mcp-smoke",
    version,
    about = "Smoke test MCP wrapper stdout cleanliness"
)]
struct Cli {
    /// Seconds to let each wrapper run
    #[arg(long, default_value_t = 6.0, value_parser = parse_timeout)]
    timeout: f64,

    /// Also test wrappers in ~/bin
    #[arg(long)]
    include_bin: bool,

    /// Specific wrapper paths to test (replaces the default list)
    wrappers: Vec<PathBuf>,
}

fn parse_timeout(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|err| format!("invalid seconds value: {err}"))?;
    if seconds.is_finite() && seconds > 0.0 {
        Ok(seconds)
    } else {
        Err("timeout must be a positive number of seconds".to_string())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let cli = Cli::parse();
    let config = HarnessConfig {
        timeout: Duration::from_secs_f64(cli.timeout),
        include_bin: cli.include_bin,
        overrides: cli.wrappers,
        root: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    let result = harness::run(&config).await;
    for verdict in &result.verdicts {
        println!("{}", verdict.report());
    }
    std::process::exit(result.exit_code());
}
