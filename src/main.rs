use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uart_hil::report;
use uart_hil::{
    Controller, HarnessConfig, LoopbackTransport, Responder, SerialTransport, SessionReport,
    Transport,
};

#[derive(Parser)]
#[command(name = "hil_tester")]
#[command(about = "Automated UART hardware-in-the-loop tester", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every test case in a configuration file
    Run {
        /// Path to the TOML configuration
        config: PathBuf,

        /// Override the serial port from the configuration
        #[arg(long)]
        port: Option<String>,

        /// Override the baud rate from the configuration
        #[arg(long)]
        baud: Option<u32>,

        /// Write a CSV report here (overrides [report] csv)
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Talk to the built-in device simulator instead of a serial port
        #[arg(long)]
        loopback: bool,

        /// Scale factor applied by the simulated device in loopback mode
        #[arg(long, default_value_t = 2.0)]
        scale: f64,
    },

    /// List the serial ports available on this machine
    Ports,

    /// Validate a configuration file and print the resolved test cases
    Check {
        /// Path to the TOML configuration
        config: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(default)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

// The main entry point for the command-line tester.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            config,
            port,
            baud,
            csv,
            loopback,
            scale,
        } => run(&config, port, baud, csv, loopback.then_some(scale)),
        Commands::Ports => list_ports(),
        Commands::Check { config } => check(&config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[ERROR] {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(
    config_path: &Path,
    port: Option<String>,
    baud: Option<u32>,
    csv: Option<PathBuf>,
    loopback_scale: Option<f64>,
) -> Result<ExitCode> {
    let mut config = HarnessConfig::load(config_path)
        .with_context(|| format!("Failed to load '{}'", config_path.display()))?;
    if let Some(port) = port {
        config.serial.port = port;
    }
    if let Some(baud) = baud {
        config.serial.baud_rate = baud;
    }
    config.validate().context("Invalid command-line override")?;
    let csv_path = csv.or_else(|| config.report.csv.clone());
    let cases = config.test_cases();

    // Either transport ends up behind the same trait object.
    let transport: Box<dyn Transport> = match loopback_scale {
        Some(factor) => {
            info!("Using built-in device simulator (scale x{})", factor);
            Box::new(LoopbackTransport::new(Responder::scaling(factor)))
        }
        None => {
            info!(
                "Opening {} at {} baud",
                config.serial.port, config.serial.baud_rate
            );
            Box::new(SerialTransport::open(&config.serial)?)
        }
    };

    let mut controller = Controller::with_config(transport, config.controller_config());
    info!("Running {} test case(s)", cases.len());
    let report = controller.run_session(&cases);
    controller.close();

    print_report(&report);
    if let Some(path) = csv_path {
        report::write_csv_file(&report, &path)
            .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
        println!("\nReport generated: {}", path.display());
    }

    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_report(report: &SessionReport) {
    let color = io::stdout().is_terminal();
    println!();
    print!("{}", report::render_table(report, color));
}

// Lists serial ports the same way the device simulator does.
fn list_ports() -> Result<ExitCode> {
    let ports = serialport::available_ports().context("Could not enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }
    Ok(ExitCode::SUCCESS)
}

fn check(config_path: &Path) -> Result<ExitCode> {
    let config = HarnessConfig::load(config_path)
        .with_context(|| format!("Failed to load '{}'", config_path.display()))?;

    println!(
        "Port {} at {} baud, {:?} parity, {} stop bit(s)",
        config.serial.port,
        config.serial.baud_rate,
        config.serial.parity,
        u8::from(config.serial.stop_bits)
    );
    println!(
        "{:<16} {:>12} {:>12} {:>10} {:>10} {:>8}",
        "Case", "Sent", "Expected", "Tolerance", "Timeout", "Retries"
    );
    for case in config.test_cases() {
        println!(
            "{:<16} {:>12} {:>12} {:>10} {:>10} {:>8}",
            case.id,
            case.sent_value,
            case.expected_value,
            case.tolerance.to_string(),
            format!("{}ms", case.timeout.as_millis()),
            case.max_retries
        );
    }
    Ok(ExitCode::SUCCESS)
}
