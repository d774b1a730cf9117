use color_eyre::{eyre::eyre, Result};
use insen_client::client::{InsenClient, InsenEvent};
use insen_client::config::ClientConfig;
use insen_client::transport::SerialTransport;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Stick deflection below this counts as resting
const SIGNIFICANT_AXIS_THRESHOLD: i16 = 5000;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (config, source) = ClientConfig::load(config_path.as_deref()).await?;
    setup_logging_env(config.logging.max_level()?);
    config.log_source(&source);

    info!("Available serial ports: {:?}", SerialTransport::available_ports());
    let (serial, transport) = SerialTransport::open(&config.serial)
        .map_err(|e| eyre!("Failed to open transport: {}", e))?;

    let client = InsenClient::spawn(transport, config.client.clone());
    let mut events = client.subscribe();

    tokio::time::timeout(CONNECT_TIMEOUT, client.wait_connected())
        .await
        .map_err(|_| eyre!("Bridge on {} did not come up", serial.port_name()))??;
    info!("Connected to bridge on {}", serial.port_name());

    if let Err(e) = client.request_status().await {
        warn!("STATUS request failed: {}", e);
    }
    if let Err(e) = client.list_controllers().await {
        warn!("LIST request failed: {}", e);
    }

    if config.poll.enabled {
        client
            .start(config.poll.controller_id, config.poll.interval())
            .await?;
    } else {
        info!("Polling disabled in configuration");
    }

    let deadline = async {
        match config.poll.stop_after() {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C received");
                break;
            }
            _ = &mut deadline => {
                info!("Configured run time elapsed");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if !print_event(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event consumer lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => {
                    error!("Event stream closed");
                    break;
                }
            }
        }
    }

    let stats = client.shutdown().await?;
    debug!("Final processor stats: {:?}", stats);
    drop(events);
    serial.join();

    Ok(())
}

/// Print one event; false when the link is gone
fn print_event(event: &InsenEvent) -> bool {
    match event {
        InsenEvent::Snapshot(snapshot) => {
            if snapshot.has_significant_input(SIGNIFICANT_AXIS_THRESHOLD) {
                println!("{}  buttons: {:?}", snapshot, snapshot.button_names());
            }
        }
        InsenEvent::DeviceInfo(info) => println!("Device: {}", info),
        InsenEvent::ControllerList(list) => {
            for entry in list.entries() {
                println!("Controller {}: {}", entry.id, entry.kind);
            }
        }
        InsenEvent::Status(status) => println!("Status: {}", status.raw),
        InsenEvent::LinkUp => info!("Link up"),
        InsenEvent::LinkDown { reason } => {
            error!(
                "Link down: {}",
                reason.as_deref().unwrap_or("no reason given")
            );
            return false;
        }
        InsenEvent::Error(e) => warn!("{}", e),
    }
    true
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
