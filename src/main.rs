//! TenantGraph CLI entry point.
//!
//! This binary provides the command-line interface for TenantGraph.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tenantgraph::cli::{BuildArgs, Cli, Commands};
use tenantgraph::cloud::ArmClient;
use tenantgraph::store::Neo4jHttpStore;
use tenantgraph::{Config, TenantGraphError, TenantGrapher};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG_PATHS: [&str; 3] = ["tenantgraph.yaml", "tenantgraph.yml", ".tenantgraph.yaml"];

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    match run(cli).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("Error: {e}");

            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            let code = e
                .downcast_ref::<TenantGraphError>()
                .map_or(1, TenantGraphError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // RUST_LOG wins over the verbosity flag
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            EnvFilter::new(format!("warn,tenantgraph={base_level}"))
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Build(args) => {
            let mut config = load_config(cli.config.as_deref())?;
            config.merge_cli_args(&args);
            build(config, args).await
        }

        Commands::Init => {
            let config_path = Path::new(DEFAULT_CONFIG_PATHS[0]);
            if config_path.exists() {
                anyhow::bail!("Configuration file already exists: {}", config_path.display());
            }

            std::fs::write(config_path, Config::example_yaml())?;
            println!("Created example configuration: {}", config_path.display());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Validate(args) => {
            let config_content = std::fs::read_to_string(&args.config)?;
            match Config::from_yaml(&config_content) {
                Ok(_) => {
                    println!("Configuration is valid: {}", args.config.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => {
                    eprintln!("Configuration error: {e}");
                    Ok(ExitCode::from(1))
                }
            }
        }
    }
}

async fn build(config: Config, args: BuildArgs) -> anyhow::Result<ExitCode> {
    let resources = tenantgraph::load_snapshot(&args.input)?;
    let filter = args.filter();
    let filtered = filter.apply(&resources);
    tracing::info!(
        snapshot = resources.len(),
        filtered = filtered.len(),
        filter = %filter,
        "Snapshot filtered"
    );

    let grapher = TenantGrapher::new(config.clone());
    let result = if args.offline {
        grapher.build_offline(&filtered)?
    } else {
        let store = Arc::new(Neo4jHttpStore::new(&config.neo4j, config.collector.store_timeout())?);
        let cloud = Arc::new(ArmClient::new(&config.azure, config.collector.retry_policy().attempt_timeout)?);

        // Ctrl-C stops collection; the graph is still built from what resolved
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing with partial results");
                on_interrupt.cancel();
            }
        });

        grapher
            .build_with(&filtered, &filter, store, cloud, &cancel, None)
            .await?
    };

    let output = match args.report {
        Some(format) => tenantgraph::reporter::Reporter::new(&config).generate(&result, format)?,
        None => tenantgraph::graph::export_graph(&result.graph, args.format)?,
    };

    if let Some(output_path) = &args.output {
        std::fs::write(output_path, &output)?;
        tracing::info!(path = %output_path.display(), "Output written");
    } else {
        println!("{output}");
    }

    if let Some(discovered_path) = &args.discovered {
        std::fs::write(discovered_path, serde_json::to_string_pretty(&result.discovered)?)?;
        tracing::info!(
            path = %discovered_path.display(),
            resources = result.discovered.len(),
            "Discovered resources written"
        );
    }

    // Partial graphs are still written, but flagged through the exit code
    Ok(if result.partial { ExitCode::from(2) } else { ExitCode::SUCCESS })
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<Config> {
    let path = match explicit {
        Some(path) => Some(path),
        None => DEFAULT_CONFIG_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists()),
    };

    let mut config = match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading configuration");
            let content = std::fs::read_to_string(path)?;
            Config::from_yaml(&content)?
        }
        None => {
            tracing::debug!("No configuration file found, using default configuration");
            Config::default()
        }
    };
    config.load_credentials_from_env();
    Ok(config)
}
