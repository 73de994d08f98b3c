use anyhow::{Context, Result};
use clap::Parser;
use packet_scanner::{
    CameraPlatform, DecodeStreamBuilder, DisplaySurface, EventBus, HttpPacketBackend,
    OperatorConsole, PacketBackend, ScannerConfig, ScannerSession, SimulatedPlatform,
    SubmissionController,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser, Debug)]
#[command(name = "packet-scanner")]
#[command(about = "Scan packet identifiers and sequence ranges from QR codes and submit them")]
#[command(version)]
#[command(long_about = "Points a camera at printed QR codes to capture a packet ID and a \
start/end sequence pair, then submits the three values to the packet backend. \
Use --simulate to replay payloads from a file instead of a real camera.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "packet-scanner.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Write logs to a file instead of stderr
    #[arg(long, value_name = "PATH", help = "Write log output to this file")]
    log_file: Option<PathBuf>,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the scanner")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Dry run mode - build the session but don't open the camera
    #[arg(long, help = "Perform dry run - wire up components but don't start scanning")]
    dry_run: bool,

    /// Replay payloads from a file through a simulated camera
    #[arg(long, value_name = "FILE", help = "Replay one payload per line instead of using a camera")]
    simulate: Option<PathBuf>,

    /// Override the submission endpoint
    #[arg(long, value_name = "URL", help = "Backend base URL, overrides submission.endpoint")]
    endpoint: Option<String>,

    /// Run without the interactive console
    #[arg(long, help = "Run headless; stop with Ctrl+C")]
    no_console: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config()?;
        return Ok(());
    }

    let _log_guard = init_logging(&args)?;

    info!("Starting packet scanner v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let mut config = ScannerConfig::load_from_file(&args.config).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(endpoint) = &args.endpoint {
        info!("Submission endpoint overridden: {}", endpoint);
        config.submission.endpoint = endpoint.clone();
    }

    match config.validate() {
        Ok(()) if args.validate_config => {
            info!("Configuration validation successful");
            println!("✓ Configuration is valid");
            return Ok(());
        }
        Ok(()) => {}
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            eprintln!("✗ Configuration validation failed: {}", e);
            std::process::exit(1);
        }
    }

    let event_bus = Arc::new(if args.debug {
        EventBus::with_debug_logging(config.system.event_bus_capacity)
    } else {
        EventBus::new(config.system.event_bus_capacity)
    });

    let platform = camera_platform(&args, &config)?;
    let stream = DecodeStreamBuilder::new().platform(platform).build()?;

    let backend = HttpPacketBackend::from_config(&config)?;
    info!("Submitting packets to {}", backend.url());
    let submitter = SubmissionController::new(Arc::new(backend) as Arc<dyn PacketBackend>);

    let mut session = ScannerSession::new(
        stream,
        DisplaySurface::window(config.camera.display_sink.clone()),
        submitter,
        Arc::clone(&event_bus),
    );

    if args.dry_run {
        info!("Dry run mode - session built but camera not started");
        println!("✓ Dry run completed successfully - all components initialized");
        return Ok(());
    }

    let (commands, command_receiver) = mpsc::channel(16);

    let reason = if args.no_console {
        info!("Running headless - press Ctrl+C to stop");
        // The sender stays alive so the session only ends on a signal
        let _commands = commands;
        session.run(command_receiver).await?
    } else {
        let console = OperatorConsole::new(commands, Arc::clone(&event_bus));
        console.start().await?;
        let reason = session.run(command_receiver).await;
        console.stop().await?;
        reason?
    };

    info!("Packet scanner stopped: {}", reason);
    Ok(())
}

fn camera_platform(args: &Args, config: &ScannerConfig) -> Result<Arc<dyn CameraPlatform>> {
    match &args.simulate {
        Some(path) => {
            let script = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read simulation script {}", path.display()))?;
            info!("Simulating camera from {}", path.display());

            Ok(Arc::new(
                SimulatedPlatform::from_payload_lines(&script).with_origin(&config.camera.origin),
            ))
        }
        None => hardware_platform(config),
    }
}

#[cfg(all(feature = "camera", target_os = "linux"))]
fn hardware_platform(config: &ScannerConfig) -> Result<Arc<dyn CameraPlatform>> {
    let platform = packet_scanner::GstCameraPlatform::new(config.camera.clone())?;
    Ok(Arc::new(platform))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
fn hardware_platform(_config: &ScannerConfig) -> Result<Arc<dyn CameraPlatform>> {
    anyhow::bail!("Built without camera support; enable the 'camera' feature or use --simulate <file>")
}

/// Headless runs have no console, so status lines go to the log at info
fn log_level(args: &Args) -> &'static str {
    if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else if args.no_console {
        "info"
    } else {
        "warn"
    }
}

fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::fmt::writer::BoxMakeWriter;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("packet_scanner={}", log_level(args))));

    let (writer, guard) = match &args.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };
    let ansi = args.log_file.is_none();

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_writer(writer)
                .with_ansi(ansi)
                .with_target(true)
                .with_thread_ids(args.debug)
                .with_file(args.debug)
                .with_line_number(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(guard)
}

/// Print default configuration in TOML format
fn print_default_config() -> Result<()> {
    println!("# Packet scanner configuration file");
    println!("# Every key may be overridden from the environment, e.g.");
    println!("# SCANNER_SUBMISSION__ENDPOINT=https://packets.example.com");
    println!();

    let default_config = toml::to_string_pretty(&ScannerConfig::default())?;
    println!("{}", default_config);

    Ok(())
}
