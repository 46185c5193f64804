//! CLI application for controlling Nanoleaf panels.
//!
//! This example drives a controller through the library: pairing, state
//! queries, brightness and color, and listening for touch gestures.
//!
//! Run with: cargo run --example nanoleaf_cli -- --help

use clap::{Parser, Subcommand};
use std::sync::Arc;
use nanoleaf_panels_rs::{
    Brightness, DeviceClient, DeviceEndpoint, EntryData, EventBus, InMemoryRegistry,
    IntegrationOptions, LIGHT_PANEL_SHAPE, Rgb, Transition, setup_entry,
};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "nanoleaf-cli")]
#[command(about = "Control Nanoleaf light panels from the command line", long_about = None)]
struct Cli {
    /// Controller address, `host` or `host:port`
    #[arg(long, global = true)]
    host: Option<DeviceEndpoint>,

    /// Authorization token (not required for pair)
    #[arg(short, long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Request a token; hold the power button for 5-7 seconds first
    Pair,

    /// Show device info and the panel layout
    Info,

    /// Set brightness for the whole array (0-100)
    Brightness {
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        level: u8,
        /// Transition in seconds
        #[arg(long, default_value = "1")]
        transition: f64,
    },

    /// Paint one panel with a static color
    Color {
        /// Panel id as shown by `info`
        panel: u32,
        /// Red component (0-255)
        red: u8,
        /// Green component (0-255)
        green: u8,
        /// Blue component (0-255)
        blue: u8,
    },

    /// Paint one panel black
    Off {
        panel: u32,
    },

    /// Print tap events until interrupted
    Listen,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let endpoint = cli.host.ok_or("controller address is required. Use --host <HOST>")?;
    let client = DeviceClient::new(endpoint.clone(), cli.token.as_deref());

    match cli.command {
        Commands::Pair => {
            println!("Requesting a token from {}...", endpoint);
            match client.acquire_token().await {
                Ok(token) => println!("Token: {}", token),
                Err(e) => eprintln!("Pairing failed ({}). Is the controller in pairing mode?", e),
            }
        }

        _ if cli.token.is_none() => {
            return Err("a token is required for this command. Use --token <TOKEN>".into());
        }

        Commands::Info => {
            let snapshot = client.fetch_snapshot().await?;
            println!("\n{} ({})", snapshot.name, snapshot.model);
            println!("  Serial: {}", snapshot.serial_no);
            if let Some(fw) = &snapshot.firmware_version {
                println!("  Firmware: {}", fw);
            }
            println!("  Power: {}", if snapshot.is_on() { "ON" } else { "OFF" });
            println!("  Brightness: {}%", snapshot.state.brightness.value);
            println!("\nLight panels:");
            for panel in snapshot.controllable_panels(LIGHT_PANEL_SHAPE) {
                println!("  {:6}  x={:5} y={:5}", panel.panel_id, panel.x, panel.y);
            }
            println!("\nDiagnostics:\n{}", serde_json::to_string_pretty(&client.diagnostics().await)?);
        }

        Commands::Brightness { level, transition } => {
            let brightness = Brightness::create_or(level);
            match client
                .set_brightness(brightness, Transition::from_secs_f64(transition))
                .await
            {
                Ok(b) => println!("Brightness set to {}%", b.value()),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Color { panel, red, green, blue } => {
            let rgb = Rgb::new(red, green, blue);
            match client.display_static_color(panel, rgb, Transition::default()).await {
                Ok(true) => println!("Panel {} painted", panel),
                Ok(false) => eprintln!("Device did not accept the color"),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Off { panel } => {
            match client
                .display_static_color(panel, Rgb::BLACK, Transition::default())
                .await
            {
                Ok(_) => println!("Panel {} off", panel),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        Commands::Listen => {
            let data = EntryData {
                host: endpoint,
                token: cli.token.unwrap_or_default(),
            };
            let bus = EventBus::new();
            let mut events = bus.subscribe();
            let entry = setup_entry(
                Uuid::new_v4(),
                data,
                IntegrationOptions::default(),
                Arc::new(InMemoryRegistry::new()),
                Arc::new(bus.clone()),
            )
            .await?;

            println!("Listening on {} panels... (Press Ctrl+C to stop)\n", entry.lights().len());
            while let Ok(event) = events.recv().await {
                println!("[{}] {} on {}", event.device_id, event.tap, event.entity_id);
            }
            entry.unload().await;
        }
    }

    Ok(())
}
