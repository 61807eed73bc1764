use chrono::Utc;
use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{LevelFilter, error, info, warn};
use rusty_rga::{
    AppConfig, FilamentOff, RgaClient, ScanLogger, ScanRecord, ScanWindow, Setting, format_pressure,
    load_config_or_default, plot_spectrum, plot_trend,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

/// Command line front end for SRS residual gas analyzers
#[derive(Parser, Debug)]
#[command(name = "rga")]
#[command(about = "Read spectra and control an SRS RGA over RS-232", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the serial port from the configuration
    #[arg(short, long, value_name = "PORT")]
    port: Option<String>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print identity and current settings
    Info,
    /// Run analog scans
    Scan {
        #[arg(long)]
        min: Option<u16>,
        #[arg(long)]
        max: Option<u16>,
        /// Steps per AMU (10..=25)
        #[arg(long)]
        resolution: Option<u16>,
        /// Number of passes, 0 runs until Ctrl+C
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Pause between passes in milliseconds
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
        /// Plot every pass in the terminal
        #[arg(long)]
        plot: bool,
        /// Leave the filament on when done
        #[arg(long)]
        keep_filament: bool,
    },
    /// Read the partial pressure at a single mass
    Mass {
        amu: u16,
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value_t = 0)]
        interval_ms: u64,
        #[arg(long)]
        plot: bool,
        #[arg(long)]
        keep_filament: bool,
    },
    /// Switch or query the filament
    Filament {
        #[command(subcommand)]
        action: FilamentAction,
    },
    /// Run the electrometer calibration
    Calibrate,
}

#[derive(Subcommand, Debug)]
enum FilamentAction {
    /// Turn on, optionally at a given emission current (mA)
    On {
        #[arg(long)]
        current: Option<f64>,
    },
    Off,
    Status,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config_or_default(args.config.as_deref());

    let log_level = args
        .log_level
        .clone()
        .unwrap_or(config.logging.log_level.clone());
    initialize_logging(&log_level)?;

    let port = args.port.clone().unwrap_or(config.serial.port.clone());
    info!("=== Rusty RGA ===");
    if let Some(path) = &args.config {
        info!("Configuration: {}", path.display());
    }
    info!("Serial port: {port}");

    let mut rga = RgaClient::builder()
        .port(&port)
        .config(config.serial.connection())
        .settings(config.instrument)
        .build()?;

    let result = match args.command {
        Command::Info => print_info(&mut rga),
        Command::Scan {
            min,
            max,
            resolution,
            count,
            interval_ms,
            plot,
            keep_filament,
        } => {
            let defaults = config.scan.window();
            let window = ScanWindow::new(
                min.unwrap_or(defaults.min),
                max.unwrap_or(defaults.max),
                resolution.unwrap_or(defaults.resolution),
            );
            let repeat = Repeat {
                count,
                interval: Duration::from_millis(interval_ms),
                shutdown: setup_shutdown_handler()?,
            };
            with_filament(&mut rga, keep_filament, |rga| {
                run_scans(rga, &config, window, &repeat, plot)
            })
        }
        Command::Mass {
            amu,
            count,
            interval_ms,
            plot,
            keep_filament,
        } => {
            let repeat = Repeat {
                count,
                interval: Duration::from_millis(interval_ms),
                shutdown: setup_shutdown_handler()?,
            };
            with_filament(&mut rga, keep_filament, |rga| {
                run_mass_readings(rga, amu, &repeat, plot)
            })
        }
        Command::Filament { action } => run_filament(&mut rga, action),
        Command::Calibrate => rga.calibrate_all().map_err(Into::into),
    };

    if let Err(e) = &result {
        error!("✗ {e}");
    }
    info!("Closing serial link");
    drop(rga);
    result
}

struct Repeat {
    count: usize,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Repeat {
    /// Whether pass `done` should still run.
    fn keep_going(&self, done: usize) -> bool {
        !self.shutdown.load(Ordering::SeqCst) && (self.count == 0 || done < self.count)
    }

    fn pause(&self, done: usize) {
        if !self.interval.is_zero() && self.keep_going(done) {
            thread::sleep(self.interval);
        }
    }
}

fn print_info(rga: &mut RgaClient) -> Result<(), Box<dyn std::error::Error>> {
    println!("Device id:          {}", rga.device_id());
    println!(
        "Model:              {} (max {} AMU)",
        rga.model(),
        rga.model().max_mass()
    );
    println!(
        "Electron multiplier: {}",
        if rga.cdem_present() { "installed" } else { "not installed" }
    );
    println!("Detector:           {:?}", rga.detector());
    println!("Electron energy:    {} eV", rga.electron_energy());
    println!("Ion energy:         {} eV", rga.ion_energy());
    println!("Focus plate:        -{} V", rga.plate_voltage());
    println!("Noise floor:        {}", rga.noise_floor());
    println!("Partial sens.:      {} mA/Torr", rga.partial_sensitivity());
    println!("Total sens.:        {} mA/Torr", rga.total_sensitivity());
    println!("Scan window:        {}", rga.get_scan_window()?);
    println!("Emission current:   {:.2} mA", rga.get_emission_current()?);
    Ok(())
}

/// Run `work` with the filament on, switching it off afterwards unless
/// `keep_on` is set.
fn with_filament<F>(
    rga: &mut RgaClient,
    keep_on: bool,
    work: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut RgaClient) -> Result<(), Box<dyn std::error::Error>>,
{
    let was_on = rga.filament_on();
    if !was_on {
        rga.turn_on_filament()?;
    }

    let result = work(rga);

    if !keep_on && !was_on {
        match rga.turn_off_filament() {
            Ok(FilamentOff::Confirmed(_)) => {}
            Ok(FilamentOff::Unconfirmed(reason)) => {
                warn!("Filament off command sent but not confirmed: {reason}");
            }
            Err(e) => {
                error!("Failed to turn off filament: {e}");
                return result.and(Err(e.into()));
            }
        }
    }
    result
}

fn run_scans(
    rga: &mut RgaClient,
    config: &AppConfig,
    window: ScanWindow,
    repeat: &Repeat,
    plot: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut logger = if config.logging.scan_logging {
        let path = create_log_file_path(Path::new(&config.logging.output_path))?;
        info!("Logging scans to {}", path.display());
        Some(ScanLogger::new(path, 10, false))
    } else {
        None
    };

    let mut pass = 0;
    while repeat.keep_going(pass) {
        let spectrum = rga.read_spectrum(window)?;
        let peak = spectrum
            .peak()
            .map(|(m, p)| format!("{} at {m:.2} AMU", format_pressure(p)))
            .unwrap_or_default();
        info!(
            "Pass {pass}: total {}, peak {peak}",
            format_pressure(spectrum.total_pressure)
        );

        if plot {
            plot_spectrum(&spectrum, None, None)?;
        } else if repeat.count == 1 {
            for (mass, pressure) in spectrum.masses.iter().zip(&spectrum.pressures) {
                println!("{mass:7.2}\t{pressure:.4e}");
            }
        }

        if let Some(logger) = logger.as_mut() {
            logger.add(ScanRecord::new(rga.device_id(), rga.model(), pass, spectrum))?;
        }

        pass += 1;
        repeat.pause(pass);
    }

    if let Some(mut logger) = logger {
        logger.flush()?;
    }
    info!("✓ {pass} scan(s) completed");
    Ok(())
}

fn run_mass_readings(
    rga: &mut RgaClient,
    amu: u16,
    repeat: &Repeat,
    plot: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut readings = Vec::new();
    while repeat.keep_going(readings.len()) {
        let pressure = rga.read_mass(amu)?;
        println!("{amu} AMU\t{pressure:.4e}");
        readings.push(pressure);
        repeat.pause(readings.len());
    }

    if plot && readings.len() > 1 {
        plot_trend(&readings, &format!("Partial pressure at {amu} AMU"), "Torr", None, None)?;
    }
    Ok(())
}

fn run_filament(
    rga: &mut RgaClient,
    action: FilamentAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        FilamentAction::On { current } => {
            if let Some(ma) = current {
                rga.set_emission_current(Setting::Value(ma))?;
            }
            let emission = rga.turn_on_filament()?;
            println!("Filament on, {emission:.2} mA");
        }
        FilamentAction::Off => match rga.turn_off_filament()? {
            FilamentOff::Confirmed(ma) => println!("Filament off ({ma:.2} mA)"),
            FilamentOff::Unconfirmed(reason) => {
                println!("Filament off command sent, readback failed: {reason}")
            }
        },
        FilamentAction::Status => {
            let emission = rga.get_emission_current()?;
            let state = if rga.get_filament_status()? { "on" } else { "off" };
            println!("Filament {state}, {emission:.2} mA");
        }
    }
    Ok(())
}

/// Setup Ctrl+C handler for stopping repeated readings
fn setup_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        info!("Ctrl+C received - finishing current pass...");
        shutdown_flag_clone.store(true, Ordering::SeqCst);
    })?;

    Ok(shutdown_flag)
}

/// Initialize logging with configurable level
fn initialize_logging(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{log_level}', using 'info'");
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    Ok(())
}

fn create_log_file_path(dir: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let filename = format!("rga_scan_{}.jsonl", Utc::now().format("%Y%m%d_%H%M%S"));
    Ok(dir.join(filename))
}
