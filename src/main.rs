// src/main.rs
// CLI entry points: serve, one-shot ask, config check

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nlweb::api::build_router;
use nlweb::app::AppState;
use nlweb::config::AppConfig;
use nlweb::handler::{AskRequest, NLWebHandler};

#[derive(Parser, Debug)]
#[command(name = "nlweb")]
#[command(version)]
#[command(about = "Natural-language search over schema.org-annotated content", long_about = None)]
struct Cli {
    /// Directory holding the YAML config files, prompts.xml, and tools.xml
    #[arg(long, env = "NLWEB_CONFIG_DIR", default_value = "./config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP/SSE server (the default)
    Serve {
        /// Override the configured bind host
        #[arg(long, env = "NLWEB_HOST")]
        host: Option<String>,
        /// Override the configured port
        #[arg(long, env = "NLWEB_PORT")]
        port: Option<u16>,
    },
    /// Answer one query and print the aggregated JSON response
    Ask {
        query: String,
        #[arg(long, default_value = "all")]
        site: String,
        #[arg(long, default_value = "list")]
        generate_mode: String,
    },
    /// Validate the configuration and exit
    CheckConfig,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config_dir)?;

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Command::Ask {
            query,
            site,
            generate_mode,
        } => ask_once(config, query, site, generate_mode).await,
        Command::CheckConfig => {
            config.validate()?;
            println!("configuration OK (mode: {})", config.mode);
            Ok(())
        }
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    let bind = config.server.bind_address();
    let app = AppState::initialize(config).await?;
    app.load_seed_corpus().await?;

    let router = build_router(app);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("nlweb listening on {bind}");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn ask_once(config: AppConfig, query: String, site: String, generate_mode: String) -> Result<()> {
    let app = AppState::initialize(config).await?;
    app.load_seed_corpus().await?;

    let params: HashMap<String, Vec<String>> = HashMap::from([
        ("query".to_string(), vec![query]),
        ("site".to_string(), vec![site]),
        ("generate_mode".to_string(), vec![generate_mode]),
        ("streaming".to_string(), vec!["false".to_string()]),
    ]);
    let handler = NLWebHandler::new(app, AskRequest::from_params(&params), None);
    let result = handler.run().await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
