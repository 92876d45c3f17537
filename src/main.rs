use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use campaign_insights::analytics::bucketing::parse_date;
use campaign_insights::analytics::{ReportInputs, build_report};
use campaign_insights::config::{AnalyticsConfig, load_config};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "insights", version, about = "Ad-performance analytics over exported report feeds")]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build every feature table from a JSON feeds file
    Report {
        /// JSON object keyed by report type (campaign, daily, product, ...)
        #[arg(long)]
        input: PathBuf,

        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Reference date (YYYY-MM-DD or YYYYMMDD); wins over the config file
        #[arg(long, env = "INSIGHTS_TODAY", value_parser = parse_today)]
        today: Option<NaiveDate>,

        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON
        #[arg(long)]
        pretty: bool,
    },
    /// Print the default configuration as TOML
    DefaultConfig {
        #[arg(long, env = "INSIGHTS_TODAY", value_parser = parse_today)]
        today: NaiveDate,
    },
}

fn parse_today(raw: &str) -> std::result::Result<NaiveDate, String> {
    parse_date(raw).ok_or_else(|| format!("invalid date '{raw}', expected YYYY-MM-DD"))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_config(path: Option<&Path>, today: Option<NaiveDate>) -> Result<AnalyticsConfig> {
    match (path, today) {
        (Some(path), _) => load_config(path, today)
            .with_context(|| format!("loading config {}", path.display())),
        (None, Some(today)) => {
            let config = AnalyticsConfig::for_today(today);
            config.validate()?;
            Ok(config)
        }
        (None, None) => bail!("no reference date: pass --today or a --config that sets `today`"),
    }
}

fn run_report(
    input: &Path,
    config: Option<&Path>,
    today: Option<NaiveDate>,
    output: Option<&Path>,
    pretty: bool,
) -> Result<()> {
    let config = resolve_config(config, today)?;
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("reading feeds {}", input.display()))?;
    let doc: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("decoding feeds {}", input.display()))?;
    if !doc.is_object() {
        bail!("feeds file must be a JSON object keyed by report type");
    }

    let inputs = ReportInputs::from_json(&doc);
    let report = build_report(&inputs, &config);
    debug!(tables = report.tables.len(), "writing report");

    let json = if pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    match output {
        Some(path) => std::fs::write(path, json + "\n")
            .with_context(|| format!("writing report {}", path.display()))?,
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{json}")?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Report {
            input,
            config,
            today,
            output,
            pretty,
        } => run_report(input, config.as_deref(), *today, output.as_deref(), *pretty),
        Commands::DefaultConfig { today } => {
            print!("{}", AnalyticsConfig::for_today(*today).to_toml()?);
            Ok(())
        }
    }
}
