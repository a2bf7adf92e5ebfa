use clap::Parser;
use std::path::PathBuf;

use lumend::config::Config;
use lumend::engine::scene::SceneStore;
use lumend::integrations::mqtt::MqttBridge;
use lumend::integrations::mqtt::RumqttcLink;
use lumend::persist::FilePersistence;
use lumend::persist::MemoryPersistence;
use lumend::persist::Persistence;
use lumend::runtime::EngineRuntime;

#[derive(Debug, Parser)]
#[command(name = "lumend", about = "Smart-light protocol bridge daemon")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "lumend.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_file(&args.config)?;

    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::from(
            config.system.log_level,
        ))
        .init();

    tracing::info!("lumend starting");
    tracing::info!("Loaded config from: {}", args.config.display());
    tracing::info!("Bound to backend entity: {}", config.device.entity_id);

    // A broken scene file degrades to in-memory scenes rather than keeping
    // the light offline.
    let persistence: Box<dyn Persistence> = match FilePersistence::open(&config.device.scene_store)
    {
        Ok(store) => Box::new(store),
        Err(e) => {
            tracing::warn!("scene persistence unavailable ({}), using memory", e);
            Box::new(MemoryPersistence::new())
        }
    };
    let scenes = SceneStore::new(persistence);
    let scene_ids = scenes.scene_ids();
    if !scene_ids.is_empty() {
        tracing::info!("Loaded {} stored scenes: {}", scene_ids.len(), scene_ids.join(", "));
    }

    let mut runtime = EngineRuntime::spawn(config.initial_session(), scenes);

    let client = RumqttcLink::new(&config.mqtt);
    let bridge = MqttBridge::new(client, config.mqtt.clone());
    let bridge_tasks = match bridge.start(&mut runtime).await {
        Ok(tasks) => tasks,
        Err(e) => {
            anyhow::bail!("failed to start MQTT bridge: {e}");
        }
    };

    tracing::info!("Bridge running, press Ctrl+C to exit");
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received shutdown signal"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }

    for task in bridge_tasks {
        task.abort();
    }
    runtime.shutdown();

    tracing::info!("lumend shutdown complete");
    Ok(())
}
