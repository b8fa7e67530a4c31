//! Lorax CLI - vaporizer communication engine.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tokio::sync::broadcast;

use lorax::cli::*;
use lorax::config::{init_logging, Config, LoggingConfig};
use lorax::error::{Error, Result};
use lorax::protocol::{encode_f32, Field, PathKind};
use lorax::session::Session;
use lorax::transport::{SimConfig, SimulatedDevice};
use lorax::types::{Capabilities, DeviceStateSnapshot, OperatingState, StateDelta};
use lorax::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_config = LoggingConfig {
        level: cli.log_level.clone(),
        color: !cli.no_color,
        ..Default::default()
    };
    init_logging(&log_config)?;
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Load config if specified
    let config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else if Config::default_path().exists() {
        Config::load(Config::default_path())?
    } else {
        Config::default()
    };

    match cli.command {
        Commands::Demo(args) => run_demo(args, config, cli.format).await,
        Commands::Config(args) => run_config(args, config),
    }
}

/// Run a session against a simulated device
async fn run_demo(args: DemoArgs, config: Config, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Text {
        println!("{}", "╔══════════════════════════════════════════╗".bright_cyan());
        println!("{}", "║     LORAX DEMO                           ║".bright_cyan());
        println!(
            "{}",
            format!("║     Version {:<29}║", VERSION).bright_cyan()
        );
        println!("{}", "╚══════════════════════════════════════════╝".bright_cyan());
        println!();
    }

    let sim = if args.legacy {
        SimConfig::legacy()
    } else if args.pup {
        SimConfig::pup()
    } else {
        SimConfig::lorax()
    };
    let device = Arc::new(SimulatedDevice::new(sim));
    let session = Session::new(device.clone(), config);
    let mut deltas = session.subscribe();

    let capabilities = session.connect().await?;
    if format == OutputFormat::Text {
        print_capabilities(&capabilities);
    }

    if let Some(index) = args.profile {
        session.switch_profile(index).await?;
    }
    if format == OutputFormat::Text {
        print_snapshot(&session.snapshot());
    }

    let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        let _ = shutdown_tx.send(());
    });

    let driver = (!args.no_heat)
        .then(|| tokio::spawn(drive_heat_cycle(Arc::clone(&device), args.legacy)));

    if format == OutputFormat::Text {
        println!(
            "{} Watching for {}s. Press Ctrl+C to stop.",
            "●".green(),
            args.seconds
        );
    }

    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            delta = deltas.recv() => match delta {
                Ok(delta) => print_delta(&delta, format),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    println!("{} {} updates skipped", "!".yellow(), n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut deadline => break,
            _ = shutdown_rx.recv() => break,
        }
    }

    if let Some(driver) = driver {
        driver.abort();
    }

    let report = session.diagnostics();
    match format {
        OutputFormat::Json => println!("{}", report.to_json()),
        OutputFormat::Text => {
            println!();
            println!("{}", "Diagnostics".bold());
            println!("  Transport:  {}", report.transport);
            println!("  Watches:    {}", report.watched_paths.join(", "));
            println!("  Polls:      {}", report.polls);
            println!("  Pending:    {}", report.pending_requests);
            println!("  Uptime:     {:?}", report.uptime);
        }
    }

    session.disconnect().await?;
    Ok(())
}

/// Walk the simulated device through preheat, session and cool down.
async fn drive_heat_cycle(device: Arc<SimulatedDevice>, legacy: bool) {
    let state_bytes = |state: OperatingState| {
        if legacy {
            encode_f32(f32::from(state.code())).to_vec()
        } else {
            vec![state.code()]
        }
    };
    let set_state = |state: OperatingState| {
        device.set_value(Field::new(PathKind::OperatingState), state_bytes(state));
    };
    let set_temp = |temp: f32| {
        device.set_value(Field::new(PathKind::HeaterTemp), encode_f32(temp).to_vec());
    };
    let step = Duration::from_millis(500);

    tokio::time::sleep(Duration::from_secs(1)).await;
    set_state(OperatingState::Preheat);

    let mut temp = 24.5_f32;
    while temp < 260.0 {
        temp = (temp + 35.0).min(260.0);
        set_temp(temp);
        tokio::time::sleep(step).await;
    }

    set_state(OperatingState::Active);
    for tick in 0..10_u8 {
        device.set_value(
            Field::new(PathKind::ElapsedTime),
            encode_f32(f32::from(tick) * 0.5).to_vec(),
        );
        tokio::time::sleep(step).await;
    }

    set_state(OperatingState::Fade);
    tokio::time::sleep(Duration::from_secs(1)).await;
    set_state(OperatingState::Idle);

    while temp > 40.0 {
        temp -= 40.0;
        set_temp(temp);
        tokio::time::sleep(step).await;
    }
}

fn print_capabilities(capabilities: &Capabilities) {
    println!(
        "{} Connected ({} mode{})",
        "✓".green(),
        capabilities.mode.to_string().bold(),
        if capabilities.pup { ", pup" } else { "" }
    );
    if let Some(limits) = capabilities.limits {
        println!(
            "  Limits: payload {} · files {} · commands {}",
            limits.max_payload, limits.max_files, limits.max_commands
        );
    }
}

fn print_snapshot(snapshot: &DeviceStateSnapshot) {
    let identity = &snapshot.identity;
    let unknown = || "-".to_string();

    println!();
    println!("{}", "Device".bold());
    println!("  Name:      {}", identity.name.clone().unwrap_or_else(unknown));
    println!("  Model:     {}", identity.model.clone().unwrap_or_else(unknown));
    println!("  Firmware:  {}", identity.firmware.clone().unwrap_or_else(unknown));
    if let Some(ref mac) = identity.mac {
        println!("  MAC:       {}", mac);
    }
    if let Some(battery) = snapshot.battery {
        println!("  Battery:   {:.0}%", battery);
    }

    println!();
    println!("{}", "Profiles".bold());
    for (index, profile) in snapshot.profiles.iter().enumerate() {
        let Some(profile) = profile else {
            continue;
        };
        let marker = if snapshot.active_profile == Some(index) {
            "▶".green()
        } else {
            " ".normal()
        };
        println!(
            "  {} {} {:<10} {:>5.0}°C  {:>3}s  {}",
            marker,
            index,
            profile.name,
            profile.temperature,
            profile.time.as_secs(),
            profile.color
        );
    }
    println!();
}

fn print_delta(delta: &StateDelta, format: OutputFormat) {
    match format {
        OutputFormat::Json => match serde_json::to_string(delta) {
            Ok(line) => println!("{}", line),
            Err(e) => eprintln!("failed to encode update: {}", e),
        },
        OutputFormat::Text => match delta {
            StateDelta::OperatingState(state) => {
                let label = format!("{:?}", state);
                let label = if state.is_heating() {
                    label.red().bold()
                } else {
                    label.cyan()
                };
                println!("  state        {}", label);
            }
            StateDelta::HeaterTemp(temp) => println!("  heater       {:.1}°C", temp),
            StateDelta::Elapsed(elapsed) => println!("  elapsed      {:.1}s", elapsed.as_secs_f32()),
            StateDelta::Battery(level) => println!("  battery      {:.0}%", level),
            other => println!("  {}", format!("{:?}", other).dimmed()),
        },
    }
}

/// Print effective or example configuration
fn run_config(args: ConfigArgs, config: Config) -> Result<()> {
    let config = if args.example {
        Config::example()
    } else {
        config
    };

    let output = toml::to_string_pretty(&config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    if let Some(ref path) = args.output {
        std::fs::write(path, &output)?;
        println!(
            "{} Configuration written to {}",
            "✓".green(),
            path.display()
        );
    } else {
        println!("{}", output);
    }

    Ok(())
}
