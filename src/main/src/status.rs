use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use control::{Fault, PowerState, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusEvent {
    Initializing,
    MissingData,
    Ready,
    HeatingOn,
    Faulted,
}

impl From<&Status> for StatusEvent {
    fn from(status: &Status) -> StatusEvent {
        match (status.reason, status.fault, status.command) {
            (None, _, _) => StatusEvent::Initializing,
            (_, Some(Fault::SensorUnavailable), _) => StatusEvent::MissingData,
            (_, Some(_), _) => StatusEvent::Faulted,
            (_, None, PowerState::On) => StatusEvent::HeatingOn,
            (_, None, PowerState::Off) => StatusEvent::Ready,
        }
    }
}

#[derive(Debug, Serialize)]
struct RoomStatus<'a> {
    state: StatusEvent,
    #[serde(flatten)]
    status: &'a Status,
}

pub fn render(statuses: &BTreeMap<String, Status>) -> Result<String> {
    let rooms: BTreeMap<&str, RoomStatus> = statuses
        .iter()
        .map(|(id, status)| {
            let room = RoomStatus {
                state: StatusEvent::from(status),
                status,
            };
            (id.as_str(), room)
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rooms)?)
}

pub async fn write_status_file(path: &Path, statuses: &BTreeMap<String, Status>) -> Result<()> {
    let json = render(statuses)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write status file {}", path.display()))
}
