//! qa-agent server - Main entry point.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use qa_server::{router, AppState, ServerConfig};

/// qa-agent - turn a URL into a Playwright test suite
#[derive(Parser)]
#[command(name = "qa-agent")]
#[command(version, about = "qa-agent - LLM-assisted browser test generation server")]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "QA_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "QA_BIND")]
    bind: Option<SocketAddr>,

    /// Directory holding output/, tests/ and evidence/
    #[arg(short, long, env = "QA_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Self-correction rounds per implementation
    #[arg(long, env = "QA_MAX_ATTEMPTS")]
    max_attempts: Option<usize>,

    /// Show the browser while tests run
    #[arg(long, env = "QA_HEADED")]
    headed: bool,

    /// Python interpreter for pytest and page inspection
    #[arg(long, env = "QA_PYTHON")]
    python: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(workspace) = self.workspace {
            config.workspace = workspace;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if self.headed {
            config.headless = false;
        }
        if let Some(python) = self.python {
            config.python = python;
        }
        config.validate()?;
        Ok(config)
    }
}

fn init_logging(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("qa=info".parse()?)
        .add_directive("warn".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(fmt::layer().json().with_target(false)).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };
    if result.is_err() {
        // Logging already initialized, continue
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json)?;

    let config = cli.into_config()?;
    let state = AppState::from_config(&config).context("building application state")?;
    info!(
        model = %state.pipeline.model(),
        llm_available = state.llm_available,
        workspace = %config.workspace.display(),
        headless = config.headless,
        "Starting qa-agent"
    );

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    info!("Listening on http://{}", config.bind);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
