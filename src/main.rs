// ABOUTME: Entry point for the savekeep binary.
// ABOUTME: Parses CLI arguments, initializes tracing, and runs slot maintenance or a save/load demo.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use savekeep_core::{EventBus, InMemoryEventBus, Persistable, SlotId, spawn_participant};
use savekeep_runtime::{OperationResult, SaveCoordinator, SavekeepConfig, StaticScene};
use savekeep_store::SlotHealth;

#[derive(Parser)]
#[command(name = "savekeep", about = "Crash-safe save slots for loosely coupled subsystems")]
struct Cli {
    /// Save directory, overriding SAVEKEEP_HOME.
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every occupied slot.
    List,
    /// Show metadata for one slot.
    Info { slot: u32 },
    /// Delete a slot and its backup.
    Delete { slot: u32 },
    /// Decode every slot and report which are corrupt.
    Validate,
    /// Quick-save two sample systems, change them, and quick-load them back.
    Demo,
}

/// Sample subsystem used by the demo command.
struct Sample {
    name: &'static str,
    state: Mutex<String>,
}

impl Sample {
    fn new(name: &'static str, state: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            state: Mutex::new(state.to_string()),
        })
    }

    fn get(&self) -> String {
        self.state.lock().map(|s| s.clone()).unwrap_or_default()
    }

    fn set(&self, value: &str) {
        if let Ok(mut s) = self.state.lock() {
            *s = value.to_string();
        }
    }
}

impl Persistable for Sample {
    fn system_name(&self) -> &str {
        self.name
    }

    fn capture(&self) -> String {
        self.get()
    }

    fn restore(&self, payload: &str) {
        self.set(payload);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "savekeep=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = SavekeepConfig::from_env().context("invalid configuration")?;
    if let Some(home) = cli.home {
        config.home = home;
    }

    let bus: Arc<dyn EventBus> = Arc::new(InMemoryEventBus::new());
    let coordinator = SaveCoordinator::open(config, bus.clone(), Arc::new(StaticScene::new("Main")))
        .context("could not open save directory")?;
    tracing::info!(dir = %coordinator.save_dir().display(), "savekeep ready");

    match cli.command {
        Command::List => {
            let slots = coordinator.registry().list();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&slots)?);
            } else if slots.is_empty() {
                println!("no saves in {}", coordinator.save_dir().display());
            } else {
                for info in slots {
                    println!(
                        "slot {:>3}  {}  {:>8.1} KB  {} ({} systems)",
                        info.slot_number, info.save_time, info.file_size_kb, info.scene_name, info.system_count
                    );
                }
            }
        }
        Command::Info { slot } => {
            let slot = SlotId::new(slot)?;
            let info = coordinator.registry().info(slot);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else if !info.exists {
                println!("slot {} is empty", slot);
            } else {
                println!("slot:    {}", info.slot_number);
                println!("saved:   {}", info.save_time);
                println!("size:    {:.1} KB", info.file_size_kb);
                println!("scene:   {}", info.scene_name);
                println!("systems: {}", info.system_count);
            }
        }
        Command::Delete { slot } => {
            let slot = SlotId::new(slot)?;
            if !coordinator.registry().delete(slot) {
                bail!("slot {} has no save to delete", slot);
            }
            println!("deleted slot {}", slot);
        }
        Command::Validate => {
            let reports = coordinator.registry().validate_all();
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&reports)?);
            } else {
                for report in &reports {
                    match &report.health {
                        SlotHealth::Missing => {}
                        SlotHealth::Ok { systems, save_time } => {
                            println!("slot {:>3}: OK ({} systems, {})", report.slot, systems, save_time)
                        }
                        SlotHealth::Corrupt(reason) => println!("slot {:>3}: CORRUPT ({})", report.slot, reason),
                        SlotHealth::Error(reason) => println!("slot {:>3}: ERROR ({})", report.slot, reason),
                    }
                }
            }
            if reports
                .iter()
                .any(|r| matches!(r.health, SlotHealth::Corrupt(_) | SlotHealth::Error(_)))
            {
                bail!("some slots failed validation");
            }
        }
        Command::Demo => {
            let player = Sample::new("Player", r#"{"hp":80,"level":3}"#);
            let world = Sample::new("World", r#"{"day":12,"weather":"rain"}"#);
            let participants = [
                spawn_participant(bus.clone(), player.clone()),
                spawn_participant(bus.clone(), world.clone()),
            ];

            let saved = coordinator.quick_save().await;
            report(&saved, cli.json)?;
            if !saved.success {
                bail!("quick save failed: {}", saved.message);
            }

            player.set(r#"{"hp":1,"level":3}"#);
            world.set(r#"{"day":13,"weather":"sun"}"#);

            let loaded = coordinator.quick_load().await;
            report(&loaded, cli.json)?;
            if !loaded.success {
                bail!("quick load failed: {}", loaded.message);
            }

            // Participants apply load data on their own tasks.
            tokio::time::sleep(coordinator.config().load_settle_delay).await;
            println!("Player: {}", player.get());
            println!("World:  {}", world.get());

            coordinator.shutdown();
            for handle in participants {
                handle.abort();
            }
        }
    }

    Ok(())
}

fn report(result: &OperationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        let status = if result.success { "ok" } else { "failed" };
        println!("slot {}: {} ({})", result.slot_number, status, result.message);
    }
    Ok(())
}
