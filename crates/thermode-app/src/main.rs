//! Thermode Application
//!
//! Command-line front end for thermal pain stimulation sessions.
//!
//! # Usage
//!
//! ```bash
//! # Ascending threshold search starting at 46 °C
//! thermode threshold --subject S01 --session A --port /dev/ttyUSB0 --start-temp 46
//!
//! # Five-minute cyclic session at 51 °C with acquisition markers
//! thermode cyclic --subject S01 --session B --port /dev/ttyUSB0 \
//!     --marker-port /dev/ttyUSB1 --target-temp 51 --total-duration 300
//!
//! # Dry run against the simulated stimulator
//! thermode --simulate threshold --subject S01 --session A
//!
//! # List serial ports
//! thermode ports
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use thermode_core::config::{ProcedureParameters, SessionParameters, DEFAULT_BASELINE_C};
use thermode_native::clock::SystemClock;
use thermode_native::logger::LogLayout;
use thermode_native::procedure::{CyclicPhase, ThresholdPhase};
use thermode_native::session::{Connector, SessionController, SimulatedConnector};

/// Thermode Application
#[derive(Parser, Debug)]
#[command(name = "thermode")]
#[command(author, version, about = "Thermal pain stimulation sessions", long_about = None)]
struct Cli {
    /// Logging verbosity level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Root folder for experiment logs
    #[arg(long, default_value = ".", global = true)]
    log_dir: PathBuf,

    /// Use the in-process simulated stimulator and marker device
    #[arg(long, global = true)]
    simulate: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Subject identifier
    #[arg(long)]
    subject: String,

    /// Session identifier
    #[arg(long)]
    session: String,

    /// Stimulator serial port (e.g., /dev/ttyUSB0 or COM5)
    #[arg(short, long, default_value = "SIM")]
    port: String,

    /// Baseline temperature in °C
    #[arg(long, default_value_t = DEFAULT_BASELINE_C)]
    baseline: f32,

    /// Hold duration per stimulus in whole seconds (1–99)
    #[arg(long, default_value_t = 1)]
    hold: u32,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ascending staircase threshold search
    Threshold {
        #[command(flatten)]
        common: CommonArgs,

        /// First temperature in °C (32–60)
        #[arg(long)]
        start_temp: u8,
    },

    /// Repeated fixed-temperature stimulation
    Cyclic {
        #[command(flatten)]
        common: CommonArgs,

        /// Marker device serial port
        #[arg(short, long, default_value = "SIM")]
        marker_port: String,

        /// Temperature in °C (32–60)
        #[arg(long)]
        target_temp: u8,

        /// Session length in seconds
        #[arg(long)]
        total_duration: u32,

        /// Delay between the begin marker and the first stimulus (ms)
        #[arg(long, default_value_t = 1_000)]
        lead_in_ms: u32,
    },

    /// List available serial ports
    Ports,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Thermode v{}", env!("CARGO_PKG_VERSION"));

    let layout = LogLayout::new(cli.log_dir);

    match cli.command {
        Commands::Threshold { common, start_temp } => {
            let params = common_params(common, |subject, session, port| {
                SessionParameters::threshold(subject, session, port, start_temp)
            });
            if cli.simulate {
                run_threshold(params, &layout, &mut SimulatedConnector::new())?;
            } else {
                run_threshold(params, &layout, &mut serial_connector()?)?;
            }
        }
        Commands::Cyclic {
            common,
            marker_port,
            target_temp,
            total_duration,
            lead_in_ms,
        } => {
            let mut params = common_params(common, |subject, session, port| {
                SessionParameters::cyclic(subject, session, port, marker_port, target_temp, total_duration)
            });
            if let ProcedureParameters::Cyclic(cyclic) = &mut params.procedure {
                cyclic.lead_in_ms = lead_in_ms;
            }
            if cli.simulate {
                run_cyclic(params, &layout, &mut SimulatedConnector::new())?;
            } else {
                run_cyclic(params, &layout, &mut serial_connector()?)?;
            }
        }
        Commands::Ports => list_ports()?,
    }

    Ok(())
}

fn common_params(
    common: CommonArgs,
    build: impl FnOnce(String, String, String) -> SessionParameters,
) -> SessionParameters {
    build(common.subject, common.session, common.port)
        .with_baseline(common.baseline)
        .with_hold(common.hold)
}

#[cfg(feature = "serial")]
#[allow(clippy::unnecessary_wraps)]
fn serial_connector() -> anyhow::Result<thermode_native::session::SerialConnector> {
    Ok(thermode_native::session::SerialConnector)
}

#[cfg(not(feature = "serial"))]
fn serial_connector() -> anyhow::Result<SimulatedConnector> {
    anyhow::bail!(
        "Serial support not enabled. Rebuild with --features serial or pass --simulate:\n\
         cargo run -p thermode-app --features serial"
    );
}

/// Drive a threshold search from stdin.
///
/// Enter starts the search, `y`/`n` answer, `q` aborts.
fn run_threshold<K: Connector>(params: SessionParameters, layout: &LogLayout, connector: &mut K) -> anyhow::Result<()> {
    let mut session: SessionController<K::Device, K::Marker, SystemClock> =
        SessionController::open_threshold(params, layout, connector, SystemClock::new())
            .context("Cannot start threshold search")?;

    if let Some(search) = session.threshold() {
        info!("Logging to {}", search.log().path().display());
    }
    prompt("Press enter when the subject is ready (q to abort)")?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let key = line.trim().chars().next().unwrap_or('\n');
        if key.eq_ignore_ascii_case(&'q') {
            session.on_stop()?;
            warn!("Threshold search aborted by operator");
            return Ok(());
        }

        match session.on_key(key)? {
            ThresholdPhase::AwaitingResponse => prompt("Painful? [y/n]")?,
            ThresholdPhase::Terminal(end) => {
                info!("Threshold search finished: {:?}", end);
                return Ok(());
            }
            ThresholdPhase::AwaitingStart | ThresholdPhase::Stimulating => {}
        }
    }

    // stdin closed
    session.on_stop()?;
    Ok(())
}

/// Run a cyclic session until it completes, or until ctrl-c or `q`.
fn run_cyclic<K: Connector>(params: SessionParameters, layout: &LogLayout, connector: &mut K) -> anyhow::Result<()> {
    let mut session: SessionController<K::Device, K::Marker> =
        SessionController::open_cyclic(params, layout, connector).context("Cannot start cyclic session")?;

    if let Some(cyclic) = session.cyclic() {
        info!("Logging to {}", cyclic.log().session_dir().display());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (stop_tx, mut stop_rx) = mpsc::channel(1);

    let key_tx = stop_tx.clone();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if matches!(line.as_deref().map(str::trim), Ok("q" | "Q")) {
                let _ = key_tx.blocking_send(());
                return;
            }
        }
    });

    let phase = runtime.block_on(async {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = stop_tx.send(()).await;
            }
        });
        println!("Running, q + enter or ctrl-c to stop");
        session.run_cyclic(&mut stop_rx).await
    })?;

    match phase {
        CyclicPhase::Terminal(end) => info!("Cyclic session finished: {:?}", end),
        other => warn!("Cyclic session left while {}", other),
    }
    Ok(())
}

#[cfg(feature = "serial")]
#[allow(clippy::unnecessary_wraps)]
fn list_ports() -> anyhow::Result<()> {
    let ports = thermode_native::device::list_ports();
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn list_ports() -> anyhow::Result<()> {
    anyhow::bail!(
        "Serial support not enabled. Rebuild with --features serial:\n\
         cargo run -p thermode-app --features serial"
    );
}

fn prompt(message: &str) -> io::Result<()> {
    let mut stdout = io::stdout();
    writeln!(stdout, "{message}")?;
    stdout.flush()
}
