mod host;

use anyhow::Context;
use envlink_core::sampler::SensorSampler;
use envlink_core::{AgentConfig, RpcDispatcher, SessionController, SharedEnvironment, StdClock};
use envlink_mqtt::MqttTransport;
use host::{HostLink, LoggedLed, SimulatedSensor};
use std::path::PathBuf;
use std::thread;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG: &str = "envlink.toml";
const DEFAULT_MAC: &str = "02:00:00:00:00:01";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,envlink_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("envlink node starting...");

    let config = load_config()?;
    config.validate().context("invalid configuration")?;

    let env = SharedEnvironment::new();

    // Both routines block on their own sleeps, so they get OS threads
    let sampler_env = env.clone();
    let timing = config.timing.clone();
    let sampler = thread::Builder::new()
        .name("sampler".into())
        .spawn(move || {
            let mut sampler = SensorSampler::new(SimulatedSensor::new(), sampler_env, &timing);
            if let Err(e) = sampler.run(&StdClock) {
                tracing::error!("sampler stopped: {}", e);
            }
        })?;

    let session_config = config.clone();
    let session = thread::Builder::new()
        .name("session".into())
        .spawn(move || {
            let mac = std::env::var("ENVLINK_MAC").unwrap_or_else(|_| DEFAULT_MAC.to_string());
            let probe = format!(
                "{}:{}",
                session_config.broker.host, session_config.broker.port
            );
            let mut controller = SessionController::new(
                HostLink::new(mac, probe),
                MqttTransport::new(session_config.device.name.as_str(), &session_config.timing),
                StdClock,
                RpcDispatcher::with_led(LoggedLed::default()),
                env,
                &session_config,
            );
            if let Err(e) = controller.run() {
                tracing::error!("session controller stopped: {}", e);
            }
        })?;

    tracing::info!(
        broker = %config.broker.host,
        port = config.broker.port,
        device = %config.device.name,
        "envlink node ready"
    );

    let sampler_handle = tokio::task::spawn_blocking(move || sampler.join());
    let session_handle = tokio::task::spawn_blocking(move || session.join());

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = sampler_handle => {
            tracing::warn!("Sampler stopped");
        }
        _ = session_handle => {
            tracing::warn!("Session controller stopped");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Read the TOML config named by `ENVLINK_CONFIG` (or `envlink.toml`), then
/// apply environment overrides.
fn load_config() -> anyhow::Result<AgentConfig> {
    let path = std::env::var("ENVLINK_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG));

    let mut config = if path.exists() {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: AgentConfig =
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded configuration");
        config
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        AgentConfig::default()
    };

    if let Ok(token) = std::env::var("ENVLINK_ACCESS_TOKEN") {
        config.broker.access_token = token;
    }
    if let Ok(host) = std::env::var("ENVLINK_BROKER_HOST") {
        config.broker.host = host;
    }

    Ok(config)
}
