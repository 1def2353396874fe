use anyhow::Result;
use clap::Parser;
use lapsecam::{ApiServer, Archive, FfmpegAssembler, FfmpegCapture, FrameCapture, LapsecamConfig, SessionController};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "lapsecam")]
#[command(about = "Camera timelapse service with session scheduling and video assembly")]
#[command(version)]
#[command(long_about = "A camera service that captures still frames on demand and runs \
timed timelapse sessions against a V4L2 device via ffmpeg. Completed sessions can be \
listed, assembled into videos, downloaded, and deleted over the HTTP API.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "lapsecam.toml", help = "Path to TOML configuration file")]
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

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without starting the service")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        print_default_config();
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting lapsecam v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match LapsecamConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }

    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        e
    })?;

    tokio::fs::create_dir_all(&config.storage.timelapse_path).await?;

    let capture: Arc<dyn FrameCapture> = Arc::new(FfmpegCapture::new(config.camera.clone()));
    let controller = Arc::new(SessionController::new(
        Arc::clone(&capture),
        config.storage.clone(),
        config.session.clone(),
    ));
    let archive = Arc::new(Archive::new(
        config.storage.clone(),
        config.archive.clone(),
        Arc::new(FfmpegAssembler),
    )?);

    let server = ApiServer::new(
        config.server.clone(),
        Arc::clone(&controller),
        archive,
        capture,
        config.camera.clone(),
        config.storage.clone(),
    );

    tokio::select! {
        result = server.serve() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            if controller.status().running {
                if let Err(e) = controller.stop() {
                    error!("Failed to stop session on shutdown: {}", e);
                }
            }
        }
    }

    info!("lapsecam exited");
    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, fmt, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lapsecam={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer().with_target(true).boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}

/// Print default configuration in TOML format
fn print_default_config() {
    let default_config = r#"# Lapsecam Configuration File
# This is the default configuration with all available options

[camera]
# Camera device path
device = "/dev/video0"
# Input pixel format requested from the device
input_format = "mjpeg"
# Resolution used when a request does not specify one
default_resolution = "640x480"
# Hard cap on a single capture invocation, in seconds
capture_timeout_seconds = 5

[storage]
# Base path for per-session frame directories
timelapse_path = "./timelapses"
# Scratch path for assembled videos and snapshots
video_temp_path = "/tmp"
# File extension for captured frames
frame_extension = "jpg"

[server]
# IP address to bind to
ip = "0.0.0.0"
# Port to listen on
port = 8000

[archive]
# Frame rate of assembled videos
output_fps = 30
# IANA timezone used when rendering archive timestamps
display_timezone = "America/New_York"

[session]
# Scheduler poll interval in milliseconds
poll_interval_ms = 100
# Settle delay after a successful capture, in milliseconds
post_capture_delay_ms = 500
"#;

    println!("{}", default_config);
}
