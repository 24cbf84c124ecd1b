mod cli;
mod config;
mod display;
mod endpoint;
mod error;
mod frame;
mod glyphs;
mod kitty;
mod producer;
mod ptz;
mod rtsp;
mod sink;
mod source;
mod transform;
mod tui;
mod view;
mod wall;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{CamerasCommand, Cli, Command};
use config::WallConfig;
use ptz::OnvifPtz;
use std::fs::{File, OpenOptions};
use std::io;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => WallConfig::default_path()?,
    };

    match cli.command {
        None | Some(Command::Wall) => {
            // The terminal belongs to the wall; logs go to a file.
            init_tracing(Some(open_log_file()?));
            tui::run_wall(config_path).await?;
        }
        Some(Command::Cameras(args)) => {
            init_tracing(None);
            let mut config = WallConfig::load(&config_path)?;
            match args.command {
                CamerasCommand::List(list_args) => {
                    print_cameras(&config, list_args.json)?;
                }
                CamerasCommand::Add(add_args) => {
                    let record = add_args.into_record();
                    let id = record.id().to_owned();
                    config.add_camera(record)?;
                    config.save(&config_path)?;
                    println!("Added camera {id} to {}", config_path.display());
                }
                CamerasCommand::Remove(remove_args) => {
                    let removed = config.remove_camera(&remove_args.id)?;
                    config.save(&config_path)?;
                    println!("Removed camera {} ({})", removed.id(), removed.address);
                }
            }
        }
        Some(Command::Ptz(args)) => {
            init_tracing(None);
            let config = WallConfig::load(&config_path)?;
            let endpoint = config
                .camera(&args.camera)
                .with_context(|| {
                    format!(
                        "no camera with id {:?} in {}",
                        args.camera,
                        config_path.display()
                    )
                })?
                .to_endpoint();
            let ptz = OnvifPtz::new(&config.ptz)?;
            let (pan, tilt) = ptz
                .move_step(&endpoint, args.direction)
                .await
                .with_context(|| format!("PTZ {} failed for {}", args.direction, endpoint.id))?;
            println!(
                "Moved {} {}: pan {pan:.3}, tilt {tilt:.3}",
                endpoint.id, args.direction
            );
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<File>) {
    let registry = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "camwall=info".into()),
    );
    match log_file {
        Some(file) => registry
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init(),
        None => registry.with(fmt::layer().with_writer(io::stderr)).init(),
    }
}

fn open_log_file() -> Result<File> {
    let path = config::log_path()?;
    config::ensure_parent_dir(&path)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed opening log file {}", path.display()))
}

fn print_cameras(config: &WallConfig, json: bool) -> Result<()> {
    if json {
        let redacted: Vec<_> = config
            .cameras
            .iter()
            .cloned()
            .map(|mut camera| {
                camera.password = camera.password.map(|_| "<redacted>".to_owned());
                camera
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&redacted)?);
        return Ok(());
    }

    if config.cameras.is_empty() {
        println!("No cameras configured. Add one with `camwall cameras add <address>`.");
        return Ok(());
    }

    println!(
        "{:<16}  {:<24}  {:<6}  {:<8}  {:<10}  NAME",
        "ID", "ADDRESS", "PORT", "ENABLED", "VARIANT"
    );
    for camera in &config.cameras {
        println!(
            "{:<16}  {:<24}  {:<6}  {:<8}  {:<10}  {}",
            camera.id(),
            camera.address,
            camera.port,
            if camera.enabled { "yes" } else { "no" },
            camera.variant.as_str(),
            camera.display_name
        );
    }
    Ok(())
}
