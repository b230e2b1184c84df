mod activity;
mod alerts;
mod routes;
mod state;
mod tick_loop;

use anyhow::{Context, Result};
use clap::Parser;
use rail_control::{AutoBrakeController, RandomOperator};
use rail_core::{SimState, Simulation};
use state::{AppState, DaemonState, WallClock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rail_daemon", about = "Real-time train dashboard simulation server")]
struct Cli {
    #[arg(long, default_value = "./content")]
    content_dir: String,
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,
    #[arg(long, default_value_t = 3001)]
    port: u16,
    /// Virtual milliseconds per wall millisecond. 0 freezes the clock.
    #[arg(long, default_value_t = 1.0, value_parser = state::parse_time_scale)]
    time_scale: f64,
    /// Resume from a saved SimState JSON instead of the scenario seed.
    #[arg(long = "state")]
    state_file: Option<String>,
    #[arg(long)]
    auto_brake: bool,
    #[arg(long)]
    chaos_seed: Option<u64>,
    #[arg(long, default_value_t = 500)]
    metrics_every_ms: u64,
    #[arg(long, default_value = "http://localhost:5173")]
    cors_origin: String,
}

fn build_simulation(cli: &Cli) -> Result<Simulation> {
    let content = rail_world::load_content(&cli.content_dir)?;
    let Some(path) = &cli.state_file else {
        return Ok(Simulation::new(content));
    };
    let json =
        std::fs::read_to_string(path).with_context(|| format!("reading state file: {path}"))?;
    let state: SimState =
        serde_json::from_str(&json).with_context(|| format!("parsing state file: {path}"))?;
    Ok(Simulation::from_state(state, content))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rail_daemon=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let sim = build_simulation(&cli)?;
    let start_ms = sim.now_ms();

    let mut daemon = DaemonState::new(sim, cli.metrics_every_ms);
    if cli.auto_brake {
        daemon.controllers.push(Box::new(AutoBrakeController::new()));
    }
    if let Some(seed) = cli.chaos_seed {
        daemon.controllers.push(Box::new(RandomOperator::new(seed, 1)));
    }

    tracing::info!(
        trains = daemon.sim.state().trains.len(),
        content_version = %daemon.sim.content().content_version,
        start_ms,
        time_scale = cli.time_scale,
        "simulation loaded"
    );

    let app_state = AppState::new(daemon, WallClock::new(start_ms, cli.time_scale));
    let clock_task = tokio::spawn(tick_loop::run_clock_loop(app_state.clone()));

    let router = routes::make_router_with_cors(app_state.clone(), &cli.cors_origin);
    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {err}");
            }
        })
        .await
        .context("serving HTTP")?;

    clock_task.abort();
    let mut daemon = app_state.sim.lock();
    daemon.sim.shutdown();
    tracing::info!(now_ms = daemon.sim.now_ms(), "simulation shut down");
    Ok(())
}
