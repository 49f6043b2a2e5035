use ap2_timeline::application::orchestrator::Orchestrator;
use ap2_timeline::config::Config;
use ap2_timeline::domain::payment::PaymentMethod;
use ap2_timeline::domain::ports::CommerceBackendRef;
use ap2_timeline::infrastructure::http::HttpBackend;
use ap2_timeline::infrastructure::in_memory::ScriptedBackend;
use ap2_timeline::interfaces::console::{ConsoleRenderer, drive_run};
use ap2_timeline::telemetry;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// What to buy, e.g. "I want a coffee machine"
    prompt: String,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Commerce backend base URL (overrides the configuration file)
    #[arg(long)]
    base_url: Option<String>,

    /// Pay automatically when the best match fits the budget
    #[arg(long)]
    auto: bool,

    /// Auto-purchase spending limit (defaults to the configured budget)
    #[arg(long, allow_hyphen_values = true)]
    budget: Option<Decimal>,

    /// Payment method used to approve a manual purchase
    #[arg(long, default_value = "card_1")]
    method: String,

    /// Use the built-in scripted backend instead of HTTP
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path).into_diagnostic()?,
        None => Config::default(),
    };
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
        config.validate().into_diagnostic()?;
    }

    let backend: CommerceBackendRef = if cli.offline {
        Arc::new(ScriptedBackend::new())
    } else {
        Arc::new(HttpBackend::new(&config))
    };

    let mode = config.purchase_mode(cli.auto, cli.budget).into_diagnostic()?;
    let method = PaymentMethod::offered(&cli.method).into_diagnostic()?;

    let handle = Orchestrator::spawn(backend, &config);
    let stdout = io::stdout();
    let mut renderer = ConsoleRenderer::new(stdout.lock());
    drive_run(
        &handle,
        &cli.prompt,
        mode,
        method,
        &mut renderer,
    )
    .await
    .into_diagnostic()?;

    Ok(())
}
