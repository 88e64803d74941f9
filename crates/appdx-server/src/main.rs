use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context;
use appdx_config::{JobFile, load_mapping};
use appdx_controller::ControllerSession;
use appdx_engine::{BoundedExecutor, Collector, ConcurrencyCap, GaugeBinding, Poller};
use appdx_metrics::{ExporterMetrics, MetricsRegistry, MetricsState, metrics_router};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "appdx", about = "Controller metrics exporter for Prometheus")]
struct Cli {
    /// Maximum outstanding controller calls (1-100).
    #[arg(short = 'c', long)]
    concurrent_connections: Option<usize>,

    #[arg(short, long, default_value_t = false)]
    debug: bool,

    #[arg(short, long, default_value = "9877")]
    port: u16,

    #[arg(short, long, default_value = "DefaultJob")]
    job_file: String,

    #[arg(short, long, default_value = "DefaultMapping")]
    mapping_file: String,

    #[arg(long, default_value = "input")]
    input_dir: PathBuf,

    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let directive = if cli.debug { "appdx=debug" } else { "appdx=info" };
    let env_filter = match directive.parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let poller = match start(&cli).await {
        Ok(poller) => poller,
        Err(err) => {
            error!("failed to start: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let reason = poller.run(shutdown_signal()).await;
    ExitCode::from(reason.exit_code())
}

async fn start(cli: &Cli) -> anyhow::Result<Poller> {
    let job_path = cli.input_dir.join(format!("{}.json", cli.job_file));
    let mapping_path = cli.input_dir.join(format!("{}.tsv", cli.mapping_file));

    let mut job = JobFile::load(&job_path).await?;
    let definitions = load_mapping(&mapping_path).await?;

    let encoded = job.encode_credentials();
    if encoded > 0 {
        info!(
            path = %job.path().display(),
            credentials = encoded,
            "encoded plain credentials in job file"
        );
    }
    job.save().await?;

    let controllers = job.controllers()?;
    let cap = ConcurrencyCap::resolve(cli.concurrent_connections, &controllers);
    info!(concurrent_connections = cap.get(), "concurrency cap set");

    let sessions = controllers
        .into_iter()
        .map(|config| ControllerSession::connect(config).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;

    let registry = Arc::new(MetricsRegistry::new());
    let bindings = GaugeBinding::register_all(&registry, definitions)?;
    let exporter = ExporterMetrics::register(&registry)?;

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {addr}"))?;
    let app = metrics_router(Arc::new(MetricsState::new(Arc::clone(&registry))));
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            warn!(error = %err, "metrics server stopped");
        }
    });
    info!("appdx metrics listening on {addr}");

    let collector = Collector::new(sessions, bindings, BoundedExecutor::new(cap), exporter);
    Ok(Poller::new(collector, job.refresh_interval_minutes()))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c, running until aborted");
        std::future::pending::<()>().await;
    }
}
