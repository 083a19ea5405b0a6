use anyhow::Result;
use log::*;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod config;
mod electricity_price;
mod heating;
mod measurement;
mod registry;
mod room;
mod status;

use config::Config;
use electricity_price::ElectricityPriceSource;
use registry::Registry;

async fn report_status(config: &Config, registry: &Registry) {
    let statuses = registry.statuses();
    for (id, status) in &statuses {
        info!(
            "[{}] {:?}: command {:?}, temperature {:?}, shift {:.2}, fault {:?}",
            id,
            status::StatusEvent::from(status),
            status.command,
            status.current_temperature,
            status.effective_shift,
            status.fault
        );
    }
    if let Some(path) = &config.status_path {
        if let Err(err) = status::write_status_file(path, &statuses).await {
            error!("{:#}", err);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::read();

    let (price_sender, prices) = watch::channel(None);
    match &config.price_table_path {
        Some(path) => {
            let source = ElectricityPriceSource::new(path.clone());
            tokio::spawn(electricity_price::run_price_poller(
                source,
                config.price_poll_interval,
                price_sender,
            ));
        }
        None => info!("No price table configured, price adjustment disabled"),
    }

    let mut registry = Registry::new(config.measurement_interval, prices);
    let rooms = config::read_rooms(&config.rooms_path).await?;
    if config.price_table_path.is_some() {
        config::warn_price_staleness(&rooms, config.price_poll_interval);
    }
    info!("Starting {} room controller(s)", rooms.len());
    registry.apply(rooms).await;

    let mut hangup = signal(SignalKind::hangup())?;
    let mut status_timer = tokio::time::interval(config.status_interval);

    loop {
        tokio::select! {
            _ = status_timer.tick() => report_status(&config, &registry).await,
            _ = hangup.recv() => {
                info!("Reloading {}", config.rooms_path.display());
                match config::read_rooms(&config.rooms_path).await {
                    Ok(rooms) => {
                        if config.price_table_path.is_some() {
                            config::warn_price_staleness(&rooms, config.price_poll_interval);
                        }
                        registry.apply(rooms).await
                    }
                    // Keep running with the previous snapshot
                    Err(err) => error!("{:#}", err),
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(err) = result {
                    error!("Failed to listen for shutdown signal: {}", err);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    registry.shutdown().await;
    Ok(())
}
