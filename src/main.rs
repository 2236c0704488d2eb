use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use qualification_service::config::AppConfig;
use qualification_service::error::AppError;
use qualification_service::telemetry;
use qualification_service::workflows::qualification::{
    calculate_scoring, qualification_router, CoefficientRate, InMemoryPeriodStore,
    InMemoryQualificationStore, QualificationService, StaticRuleSet,
};
use rust_decimal::Decimal;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "Qualification Service",
    about = "Run the procurement qualification service from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Compute a candidate score from coefficient rates, for rule authoring
    Score(ScoreArgs),
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
    /// JSON rule table with period terms and qualification parameters
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    /// Comma-separated coefficient rates, e.g. 0.9,0.75
    #[arg(long, value_delimiter = ',', value_parser = parse_rate)]
    rates: Vec<Decimal>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(args).await,
        Command::Score(args) => run_score(args),
    }
}

fn parse_rate(raw: &str) -> Result<Decimal, String> {
    raw.trim()
        .parse::<Decimal>()
        .map_err(|err| format!("failed to parse '{raw}' as a decimal rate ({err})"))
}

fn load_rules(path: Option<&PathBuf>) -> Result<StaticRuleSet, AppError> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            StaticRuleSet::from_json(&raw).map_err(|err| AppError::RuleTable {
                path: path.display().to_string(),
                detail: err.to_string(),
            })
        }
        None => Ok(StaticRuleSet::default()),
    }
}

async fn run_server(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    // CLI flag wins over APP_RULES_PATH.
    let rules_path = args.rules.take().or_else(|| config.rules.path.clone());
    let rules = load_rules(rules_path.as_ref())?;
    let service = Arc::new(QualificationService::new(
        Arc::new(InMemoryQualificationStore::new()),
        Arc::new(InMemoryPeriodStore::new()),
        Arc::new(rules),
    ));

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let app = Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .merge(qualification_router(service))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "qualification service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let rates: Vec<CoefficientRate> = args.rates.into_iter().map(CoefficientRate::new).collect();
    let scoring = calculate_scoring(&rates)?;

    println!("Coefficient rates: {}", render_rates(&rates));
    println!("Scoring: {scoring}");
    Ok(())
}

fn render_rates(rates: &[CoefficientRate]) -> String {
    if rates.is_empty() {
        return "none (scoring defaults to 1)".to_string();
    }
    rates
        .iter()
        .map(|rate| rate.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
