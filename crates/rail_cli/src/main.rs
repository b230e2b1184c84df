use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rail_control::{AutoBrakeController, CommandSource, RandomOperator};
use rail_core::{
    deliver, make_command, Command, MetricsFileWriter, Notification, NotificationSink,
    OperatorId, RiskLevel, Severity, SimState, Simulation,
};
use rail_world::load_content;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "rail_cli", about = "Train dashboard simulation CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulation headless for a span of virtual time.
    Run(RunArgs),
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct RunArgs {
    #[arg(long)]
    duration_ms: u64,
    #[arg(long, default_value = "./content")]
    content_dir: String,
    /// Resume from a saved SimState JSON instead of the scenario seed.
    #[arg(long = "state")]
    state_file: Option<String>,
    #[arg(long, default_value_t = 1000)]
    print_every_ms: u64,
    /// React to danger-distance conflicts by braking and raising signals.
    #[arg(long)]
    auto_brake: bool,
    /// Drive random operator commands from this seed.
    #[arg(long)]
    chaos_seed: Option<u64>,
    /// Trigger the all-trains emergency stop at this virtual time.
    #[arg(long)]
    emergency_stop_at_ms: Option<u64>,
    #[arg(long, default_value_t = 500)]
    metrics_every_ms: u64,
    /// Disable metrics collection to the runs/ directory.
    #[arg(long)]
    no_metrics: bool,
}

// ---------------------------------------------------------------------------
// Console output
// ---------------------------------------------------------------------------

struct ConsoleSink;

impl NotificationSink for ConsoleSink {
    fn notify(&mut self, notification: Notification) {
        match notification.severity {
            Severity::Destructive => println!(
                "*** {} at t={}ms: {} ***",
                notification.title, notification.at_ms, notification.description
            ),
            Severity::Normal => println!(
                "    {} at t={}ms: {}",
                notification.title, notification.at_ms, notification.description
            ),
        }
    }
}

fn print_status(sim: &Simulation) {
    let state = sim.state();
    let risk = sim.assessment();
    let trains: Vec<String> = state
        .trains
        .iter()
        .map(|t| format!("{} {:>3.0}km/h @{:5.1}%", t.id, t.speed, t.position))
        .collect();
    let min = risk
        .min_distance_km
        .map_or_else(|| "-".to_string(), |d| format!("{d:.2}km"));
    let level = match risk.risk_level {
        RiskLevel::Safe => "safe",
        RiskLevel::Warning => "WARNING",
        RiskLevel::Danger => "DANGER",
    };
    println!(
        "[t={:07}ms]  {}  risk={level} min={min} stopping={}",
        state.meta.now_ms,
        trains.join("  "),
        state.stopping.len(),
    );
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

/// A fixed-period deadline on the virtual clock.
struct Cadence {
    every_ms: u64,
    next_ms: u64,
}

impl Cadence {
    fn new(start_ms: u64, every_ms: u64) -> Self {
        let every_ms = every_ms.max(1);
        Self {
            every_ms,
            next_ms: start_ms + every_ms,
        }
    }

    /// True once per period when `now_ms` has reached the deadline.
    fn due(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_ms {
            return false;
        }
        while self.next_ms <= now_ms {
            self.next_ms += self.every_ms;
        }
        true
    }
}

fn generate_run_id() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

fn create_run_dir(run_id: &str) -> Result<std::path::PathBuf> {
    let dir = std::path::PathBuf::from("runs").join(run_id);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

fn write_run_info(
    dir: &std::path::Path,
    run_id: &str,
    args: &RunArgs,
    content_version: &str,
) -> Result<()> {
    let info = serde_json::json!({
        "run_id": run_id,
        "content_version": content_version,
        "runner": "rail_cli",
        "args": {
            "duration_ms": args.duration_ms,
            "print_every_ms": args.print_every_ms,
            "metrics_every_ms": args.metrics_every_ms,
            "auto_brake": args.auto_brake,
            "chaos_seed": args.chaos_seed,
            "emergency_stop_at_ms": args.emergency_stop_at_ms,
        }
    });
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn build_simulation(args: &RunArgs) -> Result<Simulation> {
    let content = load_content(&args.content_dir)?;
    let Some(path) = &args.state_file else {
        return Ok(Simulation::new(content));
    };
    let json =
        std::fs::read_to_string(path).with_context(|| format!("reading state file: {path}"))?;
    let state: SimState =
        serde_json::from_str(&json).with_context(|| format!("parsing state file: {path}"))?;
    Ok(Simulation::from_state(state, content))
}

fn run(args: &RunArgs) -> Result<()> {
    let mut sim = build_simulation(args)?;

    let mut metrics_writer: Option<MetricsFileWriter> = None;
    if !args.no_metrics {
        let run_id = generate_run_id();
        let run_dir = create_run_dir(&run_id)?;
        write_run_info(&run_dir, &run_id, args, &sim.content().content_version)?;
        let writer = MetricsFileWriter::new(run_dir.clone())
            .with_context(|| format!("opening metrics CSV in {}", run_dir.display()))?;
        metrics_writer = Some(writer);
        println!("Run directory: {}", run_dir.display());
    }

    let mut sources: Vec<Box<dyn CommandSource>> = Vec::new();
    if args.auto_brake {
        sources.push(Box::new(AutoBrakeController::new()));
    }
    if let Some(seed) = args.chaos_seed {
        sources.push(Box::new(RandomOperator::new(seed, 1)));
    }
    let operator = OperatorId("cli".to_string());
    let mut pending_stop = args.emergency_stop_at_ms;
    let mut next_command_id = 0u64;
    let mut sink = ConsoleSink;

    let step = sim.content().constants.motion_tick_ms.max(1);
    let mut print_cadence = Cadence::new(sim.now_ms(), args.print_every_ms);
    let mut metrics_cadence = Cadence::new(sim.now_ms(), args.metrics_every_ms);

    println!(
        "Starting simulation: duration={}ms trains={} content_version={}",
        args.duration_ms,
        sim.state().trains.len(),
        sim.content().content_version,
    );
    println!("{}", "-".repeat(80));
    print_status(&sim);

    let end = sim.now_ms() + args.duration_ms;
    while sim.now_ms() < end {
        // Land exactly on print and metrics deadlines between motion steps.
        let mut target = (sim.now_ms() + step).min(end).min(print_cadence.next_ms);
        if metrics_writer.is_some() {
            target = target.min(metrics_cadence.next_ms);
        }
        let mut events = sim.advance_to(target);

        let mut commands = Vec::new();
        if pending_stop.is_some_and(|at| sim.now_ms() >= at) {
            pending_stop = None;
            commands.push(make_command(
                &operator,
                sim.now_ms(),
                &mut next_command_id,
                Command::EmergencyStopAll,
            ));
        }
        for source in &mut sources {
            commands.extend(source.generate_commands(
                sim.state(),
                sim.content(),
                sim.assessment(),
                &mut next_command_id,
            ));
        }
        for cmd in &commands {
            let (_, produced) = sim.apply(cmd);
            events.extend(produced);
        }
        deliver(&events, &mut sink);

        let now = sim.now_ms();
        if print_cadence.due(now) {
            print_status(&sim);
        }
        if let Some(ref mut writer) = metrics_writer {
            if metrics_cadence.due(now) {
                let snapshot = rail_core::compute_metrics(sim.state(), sim.assessment());
                writer.write_row(&snapshot).context("writing metrics row")?;
            }
        }
    }
    sim.shutdown();

    println!("{}", "-".repeat(80));
    println!("Done. Final state at t={}ms:", sim.now_ms());
    print_status(&sim);

    if let Some(ref mut writer) = metrics_writer {
        writer.flush().context("final metrics flush")?;
        println!("Metrics written to runs/ directory.");
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(&args)?,
    }
    Ok(())
}
