use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use uart_monitor::config::{Config, ConfigLoader, LogFormat, LoggingConfig};
use uart_monitor::{
    ConnectionManager, ConnectionState, LogSink, MonitorError, MonitorEvent, SerialBackend,
    SystemBackend, BAUD_RATE,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "uart-monitor",
    version,
    about = "Serial (UART) line monitor with port auto-discovery and a timestamped session log.",
    long_about = "Detects a serial device, monitors it at 115200 baud and records every received and sent line to uart_log_<timestamp>.txt. Type text to send it to the device, or :help for commands."
)]
struct Args {
    /// Configuration file to use instead of the standard search path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device to use instead of the auto-detected one.
    #[arg(short, long)]
    port: Option<String>,

    /// Connect as soon as a device is available.
    #[arg(short, long)]
    auto_connect: bool,

    /// List serial devices and exit.
    #[arg(short, long)]
    list: bool,

    /// Directory for the session log.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

/// One line of operator input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Connect(Option<String>),
    Disconnect,
    Scan,
    Status,
    Log,
    Ports,
    Help,
    Quit,
    Send(String),
}

impl Command {
    /// Lines starting with `:` are monitor commands; `::` escapes a literal
    /// colon; everything else is sent to the device.
    fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim_end_matches(&['\r', '\n'][..]);
        if let Some(rest) = input.strip_prefix("::") {
            return Ok(Self::Send(format!(":{rest}")));
        }
        let Some(rest) = input.strip_prefix(':') else {
            return Ok(Self::Send(input.to_string()));
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts.next().map(str::to_string);
        match name.as_str() {
            "connect" | "c" => Ok(Self::Connect(arg)),
            "disconnect" | "d" => Ok(Self::Disconnect),
            "scan" => Ok(Self::Scan),
            "status" => Ok(Self::Status),
            "log" => Ok(Self::Log),
            "ports" | "list" => Ok(Self::Ports),
            "help" | "h" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!("Unknown command ':{other}'. Type :help for a list.")),
        }
    }
}

const HELP: &str = "\
Commands:
  :connect [device]  connect to the given or detected device
  :disconnect        close the connection
  :scan              look for an available device now
  :status            show the connection state
  :log               print the session log
  :ports             list serial devices
  :quit              disconnect and exit
Any other line is sent to the device followed by a newline (use :: to send a leading ':').";

// --- Main Application Entry Point ---
#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config.logging);

    let backend: Arc<dyn SerialBackend> = Arc::new(SystemBackend);
    let manager = Arc::new(ConnectionManager::with_options(
        backend,
        Arc::new(LogSink::create(&config.logging.directory)),
        config.serial.manager_options(),
    ));

    if args.list {
        print_ports(&manager);
        return Ok(());
    }

    manager.subscribe_events(print_event);
    println!(
        "UART monitor at {} baud. Session log: {}",
        BAUD_RATE,
        manager.log_sink().path().display()
    );
    println!("Type :help for commands.");

    let result = run(&manager, &config).await;

    // Release the device before the process goes away.
    blocking(&manager, |m| m.disconnect()).await??;
    result
}

fn load_config(args: &Args) -> Result<Config, BoxError> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path)?.into_config(),
        None => match ConfigLoader::load() {
            Ok(loader) => loader.into_config(),
            Err(e) => {
                eprintln!("Warning: Failed to load config, using defaults: {}", e);
                ConfigLoader::with_defaults().into_config()
            }
        },
    };

    if let Some(port) = &args.port {
        config.serial.port = Some(port.clone());
    }
    if args.auto_connect {
        config.serial.auto_connect = true;
    }
    if let Some(dir) = &args.log_dir {
        config.logging.directory = dir.clone();
    }
    Ok(config)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    let result = match logging.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if let Err(e) = result {
        eprintln!("Warning: failed to initialise logging: {}", e);
    }
}

/// Run a blocking core call off the async runtime and wait for it.
///
/// Every call is awaited before the next one starts, so scanning and
/// connecting never overlap.
async fn blocking<T, F>(manager: &Arc<ConnectionManager>, f: F) -> Result<T, tokio::task::JoinError>
where
    F: FnOnce(&ConnectionManager) -> T + Send + 'static,
    T: Send + 'static,
{
    let manager = Arc::clone(manager);
    tokio::task::spawn_blocking(move || f(&manager)).await
}

/// Forward lines from `input` over a channel, read on a dedicated thread.
///
/// Blocking stdin reads cannot be cancelled, so they stay off the runtime;
/// the thread is simply abandoned when the process exits. The channel closes
/// at end of input or after the first read error.
fn spawn_line_reader<R>(input: R) -> std::io::Result<mpsc::Receiver<std::io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("operator-input".to_string())
        .spawn(move || {
            for line in input.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// The control loop: periodic discovery, operator input and shutdown.
async fn run(manager: &Arc<ConnectionManager>, config: &Config) -> Result<(), BoxError> {
    let serial = &config.serial;
    let fixed_port = serial.port.as_deref().map(|p| serial.resolve_port(p));
    let mut candidate = fixed_port.clone();
    let mut auto_connect = serial.auto_connect;

    let mut ticker = tokio::time::interval(serial.scan_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut input = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                if fixed_port.is_none() && manager.state() == ConnectionState::Disconnected {
                    let found = blocking(manager, |m| m.scan()).await?.map(|c| c.device);
                    if found != candidate {
                        match &found {
                            Some(device) => println!("[detected {device}]"),
                            None => println!("[no serial device available]"),
                        }
                        candidate = found;
                    }
                }
                // Only the first opportunity; a dropped session is not re-opened.
                if auto_connect && manager.state() == ConnectionState::Disconnected {
                    if let Some(device) = candidate.clone() {
                        auto_connect = false;
                        report(blocking(manager, move |m| m.connect(&device)).await?);
                    }
                }
            }
            line = input.recv() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    None => break,
                    Some(Err(e)) => {
                        error!(error = %e, "failed to read operator input");
                        break;
                    }
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => execute(manager, command, &mut candidate, serial).await?,
                    Err(message) => println!("{message}"),
                }
            }
        }
    }
    info!("shutting down");
    Ok(())
}

async fn execute(
    manager: &Arc<ConnectionManager>,
    command: Command,
    candidate: &mut Option<String>,
    serial: &uart_monitor::config::SerialConfig,
) -> Result<(), tokio::task::JoinError> {
    match command {
        Command::Connect(device) => {
            let device = device.map(|d| serial.resolve_port(&d)).or_else(|| candidate.clone());
            match device {
                Some(device) => report(blocking(manager, move |m| m.connect(&device)).await?),
                None => println!("No serial device detected; pass one to :connect."),
            }
        }
        Command::Disconnect => report(blocking(manager, |m| m.disconnect()).await?),
        Command::Scan => {
            *candidate = blocking(manager, |m| m.scan()).await?.map(|c| c.device);
            match candidate {
                Some(device) => println!("[detected {device}]"),
                None => println!("[no serial device available]"),
            }
        }
        Command::Status => match manager.active_device() {
            Some(device) => println!(
                "{} ({device}, {BAUD_RATE} baud, session {})",
                manager.state(),
                manager.generation()
            ),
            None => println!("{}", manager.state()),
        },
        Command::Log => match blocking(manager, |m| m.read_log()).await? {
            Ok(content) => print!("{content}"),
            Err(e) if e.is_log_unavailable() => println!("The session log does not exist yet."),
            Err(e) => println!("{e}"),
        },
        Command::Ports => print_ports(manager),
        Command::Help => println!("{HELP}"),
        Command::Send(text) => {
            let sender = manager.sender();
            report(blocking(manager, move |_| sender.send(&text)).await?);
        }
        Command::Quit => {}
    }
    Ok(())
}

fn report(result: Result<(), MonitorError>) {
    match result {
        Ok(()) => {}
        Err(MonitorError::NotConnected) => println!("Cannot send: no active connection."),
        Err(e) => println!("[error] {e}"),
    }
}

fn print_ports(manager: &ConnectionManager) {
    let ports = manager.candidates();
    if ports.is_empty() {
        println!("No serial devices found.");
    }
    for port in ports {
        if port.blacklisted {
            println!("  {} (reserved, never auto-selected)", port.device);
        } else {
            println!("  {}", port.device);
        }
    }
}

fn print_event(event: &MonitorEvent) {
    match event {
        MonitorEvent::Line(line) => println!("{line}"),
        MonitorEvent::StateChanged { state, device } => {
            debug!(%state, ?device, "state changed");
            match (state, device) {
                (ConnectionState::Connected, Some(device)) => {
                    println!("[connected to {device} at {BAUD_RATE} baud]")
                }
                (ConnectionState::Disconnected, Some(device)) => {
                    println!("[disconnected from {device}]")
                }
                _ => {}
            }
        }
        MonitorEvent::ReadError(message) => println!("[error] {message}"),
    }
}

// --- Graceful Shutdown Handler ---
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    println!("\nSignal received, disconnecting...");
}
