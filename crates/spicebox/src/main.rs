use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use spicebox::backend::DeviceStore;
use spicebox::backend::DeviceUpdate;
use spicebox::backend::NewDevice;
use spicebox::backend::RestBackend;
use spicebox::config::SinkKind;
use spicebox::monitor::watch_devices;
use spicebox::mqtt::MqttReadingStream;
use spicebox::mqtt::RumqttcClient;
use spicebox::notify::notification_preference;
use spicebox::notify::set_notification_preference;
use spicebox::notify::spawn_dispatcher;
use spicebox::notify::FilePreferenceStore;
use spicebox::notify::LogSink;
use spicebox::notify::MqttSink;
use spicebox::notify::Notification;
use spicebox::notify::NotificationGate;
use spicebox::notify::NotificationPreference;
use spicebox::notify::NotificationSink;
use spicebox::notify::PermissionState;
use spicebox::Config;
use spicebox::Monitor;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(version, about = "Spice container weight monitor")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "spicebox.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor all devices and send low-weight notifications
    Run,

    /// Manage registered devices
    #[command(subcommand)]
    Devices(DevicesCommand),

    /// Manage the notification preference
    #[command(subcommand)]
    Notifications(NotificationsCommand),
}

#[derive(Subcommand)]
enum DevicesCommand {
    List,

    Add {
        device_id: String,

        #[arg(long)]
        name: Option<String>,
    },

    Update {
        device_id: String,

        #[arg(long)]
        name: Option<String>,

        /// Low-weight threshold in grams
        #[arg(long)]
        min: Option<f64>,

        /// Container capacity in grams
        #[arg(long)]
        max: Option<f64>,

        #[arg(long)]
        image_url: Option<String>,
    },

    Remove {
        device_id: String,
    },
}

#[derive(Subcommand)]
enum NotificationsCommand {
    Enable,
    Disable,
    Status,
    /// Send a test notification through the configured sink
    Test,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.filter())
        .init();

    tracing::debug!("Loaded config from: {}", cli.config.display());

    match cli.command {
        Command::Run => run(config).await,
        Command::Devices(cmd) => devices(&config, cmd).await,
        Command::Notifications(cmd) => notifications(&config, cmd).await,
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("spicebox starting");

    let backend =
        Arc::new(RestBackend::new(&config.backend).context("Failed to create backend client")?);

    let gate = NotificationGate::new(
        Box::new(FilePreferenceStore::new(&config.notifications.preference_path)),
        Box::new(config.notifications.permission),
    );
    let (dispatch_tx, dispatcher) = spawn_dispatcher(build_sink(&config).await?);

    let monitor = Monitor::new(backend.clone(), Box::new(gate), dispatch_tx);
    let shutdown = CancellationToken::new();

    let watcher = tokio::spawn(watch_devices(
        backend,
        monitor.sender(),
        config.backend.device_refresh(),
        shutdown.child_token(),
    ));

    let api = match &config.api {
        Some(api) if api.enabled => {
            let (listen, port) = (api.listen.clone(), api.port);
            let dashboard = monitor.dashboard();
            let token = shutdown.child_token();
            Some(tokio::spawn(async move {
                if let Err(e) = spicebox::api::serve(listen, port, dashboard, token).await {
                    tracing::error!("HTTP API server failed: {}", e);
                }
            }))
        }
        _ => None,
    };

    let client = RumqttcClient::new(&config.mqtt, config.mqtt.client_id.clone())
        .context("Failed to create MQTT client")?;
    let stream = MqttReadingStream::new(client, config.mqtt.readings_topic.clone());

    let session = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = monitor.run(Box::new(stream), shutdown.clone()).await;
            shutdown.cancel();
            result
        })
    };

    tracing::info!("Monitoring, press Ctrl+C to exit");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
            }
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }

    let result = session.await;
    if let Err(e) = watcher.await {
        tracing::warn!("Device watcher task failed: {}", e);
    }
    if let Some(api) = api {
        if let Err(e) = api.await {
            tracing::warn!("HTTP API task failed: {}", e);
        }
    }
    // The monitor held the last dispatch sender; the dispatcher drains and exits.
    if let Err(e) = dispatcher.await {
        tracing::warn!("Notification dispatcher task failed: {}", e);
    }

    result
        .context("Monitor task panicked")?
        .map_err(|e| anyhow::anyhow!("Monitor failed: {}", e))?;

    tracing::info!("spicebox shutdown complete");
    Ok(())
}

async fn build_sink(config: &Config) -> anyhow::Result<Box<dyn NotificationSink>> {
    match config.notifications.sink {
        SinkKind::Log => Ok(Box::new(LogSink)),
        SinkKind::Mqtt => {
            let client =
                RumqttcClient::new(&config.mqtt, format!("{}-alerts", config.mqtt.client_id))
                    .context("Failed to create MQTT alert client")?;
            let sink = MqttSink::connect(client, config.notifications.alert_topic_prefix.clone())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect MQTT alert sink: {}", e))?;
            Ok(Box::new(sink))
        }
    }
}

async fn devices(config: &Config, cmd: DevicesCommand) -> anyhow::Result<()> {
    let backend = RestBackend::new(&config.backend).context("Failed to create backend client")?;

    match cmd {
        DevicesCommand::List => {
            let devices = backend.list_devices().await?;
            if devices.is_empty() {
                println!("No devices registered");
            }
            for device in devices {
                println!(
                    "{}\t{}\tmin {}g\tmax {}g",
                    device.device_id,
                    device.display_name(),
                    device.threshold_g(),
                    device.capacity_g()
                );
            }
        }
        DevicesCommand::Add { device_id, name } => {
            let new = NewDevice::new(&device_id, name.as_deref())?;
            let device = backend.add_device(&new).await?;
            println!("Added {} ({})", device.device_id, device.display_name());
        }
        DevicesCommand::Update {
            device_id,
            name,
            min,
            max,
            image_url,
        } => {
            let update = DeviceUpdate {
                container_name: name,
                min_quantity_g: min,
                max_capacity_g: max,
                image_url,
            };
            if update.is_empty() {
                anyhow::bail!("Nothing to update for {}", device_id);
            }
            let device = backend.update_device(&device_id, &update).await?;
            println!("Updated {} ({})", device.device_id, device.display_name());
        }
        DevicesCommand::Remove { device_id } => {
            let device = backend.delete_device(&device_id).await?;
            println!("Removed {} ({})", device.device_id, device.display_name());
        }
    }

    Ok(())
}

async fn notifications(config: &Config, cmd: NotificationsCommand) -> anyhow::Result<()> {
    let store = FilePreferenceStore::new(&config.notifications.preference_path);

    match cmd {
        NotificationsCommand::Enable => {
            set_notification_preference(&store, NotificationPreference::Enabled)?;
            println!("Notifications enabled");
        }
        NotificationsCommand::Disable => {
            set_notification_preference(&store, NotificationPreference::Disabled)?;
            println!("Notifications disabled");
        }
        NotificationsCommand::Status => {
            println!("preference: {}", notification_preference(&store)?);
            println!("permission: {}", config.notifications.permission);
        }
        NotificationsCommand::Test => {
            if config.notifications.permission != PermissionState::Granted {
                anyhow::bail!(
                    "Notification permission is {}, not sending test notification",
                    config.notifications.permission
                );
            }
            let sink = build_sink(config).await?;
            let sent = sink.notify(&Notification::test()).await;
            // Flush before the runtime goes away with the queued publish
            let closed = sink.close().await;
            sent.map_err(|e| anyhow::anyhow!("Test notification failed: {}", e))?;
            closed.map_err(|e| anyhow::anyhow!("Failed to flush {} sink: {}", sink.name(), e))?;
            println!("Test notification sent via {}", sink.name());
        }
    }

    Ok(())
}
