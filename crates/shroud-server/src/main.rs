//! The `shroud` admin binary.

use clap::Parser;
use shroud_config::{CliArgs, Command, Config, ConfigError};
use shroud_disclosure::EngineSettings;
use shroud_server::{DemoError, PlatformDirs, PlatformError, engine_settings, run_demo};
use shroud_world::{MaterialRegistry, RegistryError};

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Demo(#[from] DemoError),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("shroud: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), ServerError> {
    let args = CliArgs::parse();
    let dirs = match &args.config {
        Some(dir) => PlatformDirs::with_config_dir(dir),
        None => PlatformDirs::resolve()?,
    };
    dirs.create_dirs()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(&args);
    shroud_log::init_logging(
        Some(&dirs.log_dir),
        cfg!(debug_assertions),
        Some(&config),
    );
    tracing::debug!(config = %dirs.config_dir.display(), "config loaded");

    match args.command.unwrap_or(Command::Status) {
        Command::Status => {
            let registry = MaterialRegistry::from_catalog()?;
            println!("protected types: {}", registry.protected_types().len());
            print_settings(&engine_settings(&config));
        }
        Command::Version => {
            println!("shroud {}", env!("CARGO_PKG_VERSION"));
        }
        Command::Reload => {
            let on_disk = Config::load_or_create(&dirs.config_dir)?;
            let mut effective = on_disk.clone();
            effective.apply_cli_overrides(&args);
            if effective == Config::default() {
                println!("config.ron matches the defaults");
            } else {
                println!("config.ron parsed; effective settings:");
            }
            print_settings(&engine_settings(&effective));
        }
        Command::Demo => {
            let report = run_demo(engine_settings(&config))?;
            println!("concealed on delivery: {}", report.concealed);
            println!("still hidden:          {}", report.still_hidden);
            println!("block changes sent:    {}", report.block_changes);
            println!("slot updates sent:     {}", report.slot_updates);
        }
    }
    Ok(())
}

fn print_settings(settings: &EngineSettings) {
    println!("enable_protection:          {}", settings.enable_protection);
    println!("visibility_radius:          {}", settings.visibility_radius);
    println!("deferred_block_loading:     {}", settings.deferred_block_loading);
    println!("deferred_container_loading: {}", settings.deferred_container_loading);
    println!("deferred_inventory_loading: {}", settings.deferred_inventory_loading);
    println!(
        "blocks_per_tick:            {} every {} ticks",
        settings.blocks_per_tick, settings.block_interval_ticks
    );
    println!(
        "items_per_tick:             {} every {} ticks",
        settings.items_per_tick, settings.item_interval_ticks
    );
}
