//! Periodic status log built from store snapshots.
//!
//! Reads the store the same way an exporter would: one snapshot per report,
//! derived metrics computed from it on the spot.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::derived::{dew_point, feels_like};
use crate::observation::is_unknown;
use crate::store::{Snapshot, SnapshotStore};

fn fmt_value(value: f64) -> String {
    if is_unknown(value) {
        "unknown".to_string()
    } else {
        format!("{:.1}", value)
    }
}

/// One-line summary of a snapshot.
pub fn status_line(station_name: &str, snapshot: &Snapshot) -> String {
    let health = format!(
        "[{}] connected={} reconnects={} scrape_errors={}",
        station_name, snapshot.connected, snapshot.reconnects, snapshot.scrape_errors
    );

    let Some(obs) = snapshot.observation else {
        return format!("{} no observation yet", health);
    };

    let mut line = format!(
        "{} last_obs={} temp={}°C humidity={}% dew_point={}°C feels_like={}°C",
        health,
        obs.timestamp,
        fmt_value(obs.air_temperature),
        fmt_value(obs.relative_humidity),
        fmt_value(dew_point(obs.air_temperature, obs.relative_humidity)),
        fmt_value(feels_like(
            obs.air_temperature,
            obs.relative_humidity,
            obs.wind_avg
        )),
    );
    if let Some(epoch) = snapshot.rain_start {
        line.push_str(&format!(" rain_start={}", epoch));
    }
    line
}

/// Log a status line every `interval` until shutdown.
pub async fn run_status_reporter(
    station_name: String,
    store: Arc<SnapshotStore>,
    interval: Duration,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                log::info!("{}", status_line(&station_name, &store.read_snapshot()));
            }
        }
    }
}
