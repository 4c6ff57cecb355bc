pub mod cli;
pub mod clients;
pub mod clock;
pub mod config;
pub mod constants;
pub mod domain;
pub mod models;
pub mod services;
pub mod state;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use tracing::info;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands};
pub use config::Config;
pub use state::PlacesState;

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if matches!(command, Commands::Init) {
        return cli::cmd_init();
    }

    let config = Config::load()?;
    config.validate()?;

    init_tracing(&config)?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(handle)
    } else {
        None
    };

    if config.places.api_key.is_empty() {
        anyhow::bail!(
            "No places API key configured. Set places.api_key in config.toml or export {}",
            config::API_KEY_ENV
        );
    }

    let options = cli.bias.search_options();

    match command {
        Commands::Search { query } => cli::cmd_search(config, options, &query.join(" ")).await,
        Commands::Resolve { query, pick } => {
            cli::cmd_resolve(config, options, &query.join(" "), pick).await
        }
        Commands::Interactive => cli::cmd_interactive(config, options, prometheus_handle).await,
        Commands::Init => Ok(()),
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = if config.observability.json_logs {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let mut builder = tracing_loki::builder();
        for (key, value) in &config.observability.loki_labels {
            builder = builder.label(key.as_str(), value.as_str())?;
        }
        let (layer, task) = builder.build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(url = %config.observability.loki_url, "Loki logging initialized");
    } else {
        registry.init();
    }

    Ok(())
}
