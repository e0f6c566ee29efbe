//! Crossbar CLI - SW-P-08 broadcast router control service.

use clap::Parser;
use colored::Colorize;
use tokio::signal;
use tokio::sync::broadcast;

use crossbar::cli::{Cli, CheckArgs, Commands, ConfigAction, ConfigArgs, ServeArgs};
use crossbar::config::{init_logging, Config};
use crossbar::error::Result;
use crossbar::router::Router;
use crossbar::server::{self, ServerState};
use crossbar::transport;
use crossbar::VERSION;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_config = crossbar::config::LoggingConfig {
        level: cli.log_level.clone(),
        color: !cli.no_color,
        ..Default::default()
    };
    init_logging(&log_config)?;

    // Load config if specified
    let config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else if Config::default_path().exists() {
        Config::load(Config::default_path())?
    } else {
        Config::default()
    };

    // Dispatch command
    match cli.command {
        Commands::Serve(args) => run_serve(args, config).await,
        Commands::Check(args) => run_check(args, config).await,
        Commands::Config(args) => run_config(args, config),
    }
}

/// Apply CLI overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, args: &ServeArgs) {
    if let Some(kind) = args.transport {
        config.router.transport = kind;
    }
    if let Some(ref host) = args.tcp_host {
        config.router.tcp.host = host.clone();
    }
    if let Some(port) = args.tcp_port {
        config.router.tcp.port = port;
    }
    if let Some(ref path) = args.serial_path {
        config.router.serial.path = path.clone();
    }
    if let Some(baud) = args.serial_baud {
        config.router.serial.baud = baud;
    }
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if args.no_auto_connect {
        config.router.auto_connect = false;
    }
}

/// Run the router link and client fan-out.
async fn run_serve(args: ServeArgs, mut config: Config) -> Result<()> {
    apply_overrides(&mut config, &args);
    config.validate()?;

    println!("{}", "crossbar".bright_cyan().bold());
    println!("  version   {VERSION}");
    match config.router.transport {
        transport::TransportKind::Tcp => {
            println!(
                "  router    tcp://{}:{}",
                config.router.tcp.host, config.router.tcp.port
            );
        }
        transport::TransportKind::Serial => {
            println!(
                "  router    serial://{}@{}",
                config.router.serial.path, config.router.serial.baud
            );
        }
    }
    println!("  clients   ws://{}/ws", config.server.listen);
    println!();

    let router = Router::new(config.router.clone(), config.matrix);
    let state = ServerState::new(router.clone());

    // Setup shutdown signal
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            let _ = signal::ctrl_c().await;
            println!();
            println!("{} Shutting down.", "●".yellow());
            let _ = shutdown_tx.send(());
        });
    }

    let link = tokio::spawn(router.clone().run(shutdown_tx.subscribe()));

    println!("{} Running. Press Ctrl+C to stop.", "●".green());
    server::serve(state, &config.server, shutdown_tx.subscribe()).await?;

    let _ = link.await;
    println!("{} Stopped.", "●".yellow());
    Ok(())
}

/// Validate configuration, optionally probing the router endpoint.
async fn run_check(args: CheckArgs, config: Config) -> Result<()> {
    config.validate()?;
    println!("{} Configuration valid.", "✓".green());

    if args.probe {
        let mut t = transport::connect(
            config.router.transport,
            &config.router.tcp,
            &config.router.serial,
        )
        .await?;
        println!(
            "{} Router endpoint reachable ({}).",
            "✓".green(),
            t.endpoint()
        );
        t.close().await?;
    }

    Ok(())
}

/// Configuration file management.
fn run_config(args: ConfigArgs, config: Config) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let target = path.unwrap_or_else(Config::default_path);
            if target.exists() && !force {
                return Err(crossbar::Error::Config(format!(
                    "{} already exists (use --force to overwrite)",
                    target.display()
                )));
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            Config::example().save(&target)?;
            println!("{} Wrote {}", "✓".green(), target.display());
            Ok(())
        }
        ConfigAction::Show => {
            let text = toml::to_string_pretty(&config)
                .map_err(|e| crossbar::Error::Config(e.to_string()))?;
            println!("{text}");
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", Config::default_path().display());
            Ok(())
        }
    }
}
