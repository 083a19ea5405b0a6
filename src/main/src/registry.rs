use anyhow::{anyhow, Result};
use core::time::Duration;
use log::*;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use control::{Controller, ElectricityPrice, Reading, Status};

use crate::config::RoomConfig;
use crate::heating::{Actuator, FileActuator};
use crate::measurement::run_measurement_timer;
use crate::room::{Room, RoomEvent};

const ROOM_QUEUE_DEPTH: usize = 16;

pub type PriceFeed = watch::Receiver<Option<Reading<ElectricityPrice>>>;

struct RoomHandle {
    config: RoomConfig,
    events: mpsc::Sender<RoomEvent>,
    status: watch::Receiver<Status>,
    controller: JoinHandle<()>,
    // Measurement timer and price forwarder
    feeders: Vec<JoinHandle<()>>,
}

impl RoomHandle {
    async fn deactivate(self) {
        for feeder in &self.feeders {
            feeder.abort();
        }
        // The queue may already be gone if the controller task ended
        let _ = self.events.send(RoomEvent::Shutdown).await;
        if let Err(err) = self.controller.await {
            error!("[{}] Controller task failed: {}", self.config.id, err);
        }
    }
}

// Copies every price publication into the room's own queue
async fn forward_prices(room_id: String, mut prices: PriceFeed, events: mpsc::Sender<RoomEvent>) {
    loop {
        let reading = *prices.borrow_and_update();
        if let Some(reading) = reading {
            if events.send(RoomEvent::Price(reading)).await.is_err() {
                break;
            }
        }
        if prices.changed().await.is_err() {
            debug!("[{}] Price feed closed", room_id);
            break;
        }
    }
}

/// Every configured room and the tasks serving it. The only state shared
/// between rooms is this map.
pub struct Registry {
    rooms: BTreeMap<String, RoomHandle>,
    measurement_interval: Duration,
    prices: PriceFeed,
}

impl Registry {
    pub fn new(measurement_interval: Duration, prices: PriceFeed) -> Self {
        Registry {
            rooms: BTreeMap::new(),
            measurement_interval,
            prices,
        }
    }

    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    pub fn activate(&mut self, room: RoomConfig) -> Result<()> {
        let actuator = FileActuator::new(room.actuator.clone());
        self.activate_with(room, actuator)
    }

    pub fn activate_with<A: Actuator>(&mut self, room: RoomConfig, actuator: A) -> Result<()> {
        if self.rooms.contains_key(&room.id) {
            return Err(anyhow!("room {:?} is already active", room.id));
        }

        let config = room.configuration();
        config.validate()?;

        let mut controller = Controller::new(config, OffsetDateTime::now_utc());
        controller.set_mode(room.mode);
        let (room_task, status) = Room::new(room.id.clone(), controller, actuator);
        let (events, receiver) = mpsc::channel(ROOM_QUEUE_DEPTH);
        let controller = tokio::spawn(room_task.run(receiver));

        let mut feeders = vec![tokio::spawn(run_measurement_timer(
            room.id.clone(),
            room.temperature_sensor.clone(),
            self.measurement_interval,
            events.clone(),
        ))];
        if room.use_price {
            feeders.push(tokio::spawn(forward_prices(
                room.id.clone(),
                self.prices.clone(),
                events.clone(),
            )));
        }

        self.rooms.insert(
            room.id.clone(),
            RoomHandle {
                config: room,
                events,
                status,
                controller,
                feeders,
            },
        );
        Ok(())
    }

    pub async fn deactivate(&mut self, id: &str) {
        if let Some(handle) = self.rooms.remove(id) {
            handle.deactivate().await;
        }
    }

    pub async fn post(&self, id: &str, event: RoomEvent) -> Result<()> {
        let handle = self
            .rooms
            .get(id)
            .ok_or_else(|| anyhow!("unknown room {:?}", id))?;
        handle
            .events
            .send(event)
            .await
            .map_err(|_| anyhow!("room {:?} is not running", id))
    }

    /// Brings the registry in line with a freshly read room file.
    pub async fn apply(&mut self, rooms: Vec<RoomConfig>) {
        let wanted: Vec<String> = rooms.iter().map(|room| room.id.clone()).collect();
        for id in self.room_ids() {
            if !wanted.contains(&id) {
                info!("[{}] Room removed from configuration", id);
                self.deactivate(&id).await;
            }
        }

        for room in rooms {
            let existing = self.rooms.get(&room.id).map(|handle| handle.config.clone());
            match existing {
                Some(current) if current == room => {}
                Some(current) if current.same_wiring(&room) => {
                    let mut result = self
                        .post(&room.id, RoomEvent::Configure(room.configuration()))
                        .await;
                    if result.is_ok() && current.mode != room.mode {
                        result = self.post(&room.id, RoomEvent::SetMode(room.mode)).await;
                    }
                    match result {
                        Ok(()) => {
                            if let Some(handle) = self.rooms.get_mut(&room.id) {
                                handle.config = room;
                            }
                        }
                        Err(err) => error!("{:#}", err),
                    }
                }
                Some(_) => {
                    info!("[{}] Room wiring changed, restarting", room.id);
                    self.deactivate(&room.id).await;
                    self.activate_logged(room);
                }
                None => self.activate_logged(room),
            }
        }
    }

    fn activate_logged(&mut self, room: RoomConfig) {
        let id = room.id.clone();
        if let Err(err) = self.activate(room) {
            error!("[{}] Failed to activate room: {:#}", id, err);
        }
    }

    pub fn statuses(&self) -> BTreeMap<String, Status> {
        self.rooms
            .iter()
            .map(|(id, handle)| (id.clone(), *handle.status.borrow()))
            .collect()
    }

    pub async fn shutdown(&mut self) {
        for id in self.room_ids() {
            self.deactivate(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_rooms;
    use crate::heating::testing::RecordingActuator;
    use control::{PowerState, Temperature};
    use std::path::Path;

    fn room(id: &str, sensor: &Path, extra: &str) -> RoomConfig {
        let json = format!(
            r#"[{{"id": "{}", "temperature_sensor": {:?}, "actuator": "unused"{}}}]"#,
            id,
            sensor.display().to_string(),
            extra
        );
        parse_rooms(&json).unwrap().remove(0)
    }

    async fn wait_for(registry: &Registry, id: &str, check: impl Fn(&Status) -> bool) -> Status {
        for _ in 0..200 {
            if let Some(status) = registry.statuses().get(id) {
                if check(status) {
                    return *status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("room {} never reached the expected state", id);
    }

    #[tokio::test]
    async fn test_room_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = dir.path().join("lounge");
        std::fs::write(&sensor, "18.0\n").unwrap();

        let (_price_sender, prices) = watch::channel(None);
        let mut registry = Registry::new(Duration::from_millis(10), prices);
        let actuator = RecordingActuator::default();
        registry
            .activate_with(room("lounge", &sensor, ""), actuator.clone())
            .unwrap();
        assert!(registry
            .activate_with(room("lounge", &sensor, ""), actuator.clone())
            .is_err());

        let status = wait_for(&registry, "lounge", |s| s.command == PowerState::On).await;
        assert_eq!(status.last_dispatched_setpoint, Some(Temperature::new(35.0)));

        std::fs::write(&sensor, "23.0\n").unwrap();
        wait_for(&registry, "lounge", |s| s.command == PowerState::Off).await;
        assert_eq!(
            actuator.writes(),
            vec![Temperature::new(35.0), Temperature::new(5.0)]
        );

        registry.deactivate("lounge").await;
        assert!(registry.statuses().is_empty());
        assert!(registry.post("lounge", RoomEvent::Shutdown).await.is_err());
    }

    #[tokio::test]
    async fn test_prices_reach_rooms_that_use_them() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = dir.path().join("study");
        std::fs::write(&sensor, "20.8\n").unwrap();

        let (price_sender, prices) = watch::channel(None);
        let mut registry = Registry::new(Duration::from_millis(10), prices);
        let threshold = r#", "use_price": true, "target_temperature": 21.0, "price_rule": {"strategy": "threshold", "below": 0.1, "below_delta": 0.5, "above": 0.3, "above_delta": -1.0}"#;
        registry
            .activate_with(room("study", &sensor, threshold), RecordingActuator::default())
            .unwrap();

        price_sender.send_replace(Some(Reading::valid(
            ElectricityPrice::new(0.05),
            OffsetDateTime::now_utc(),
        )));
        let status = wait_for(&registry, "study", |s| s.price_delta == 0.5).await;
        assert_eq!(status.effective_shift, 0.5);
        wait_for(&registry, "study", |s| s.command == PowerState::On).await;

        registry.shutdown().await;
        assert!(registry.room_ids().is_empty());
    }

    #[tokio::test]
    async fn test_apply_reconfigures_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let lounge = dir.path().join("lounge");
        let study = dir.path().join("study");
        std::fs::write(&lounge, "19.0\n").unwrap();
        std::fs::write(&study, "19.0\n").unwrap();

        let (_price_sender, prices) = watch::channel(None);
        let mut registry = Registry::new(Duration::from_millis(10), prices);
        registry
            .activate_with(room("lounge", &lounge, ""), RecordingActuator::default())
            .unwrap();
        registry
            .activate_with(room("study", &study, ""), RecordingActuator::default())
            .unwrap();
        wait_for(&registry, "lounge", |s| s.command == PowerState::On).await;

        // Lounge gets a lower target, study is dropped
        registry
            .apply(vec![room("lounge", &lounge, r#", "target_temperature": 17.0"#)])
            .await;
        assert_eq!(registry.room_ids(), vec!["lounge".to_string()]);
        let status = wait_for(&registry, "lounge", |s| s.command == PowerState::Off).await;
        assert_eq!(status.target_temperature, Temperature::new(17.0));

        registry.shutdown().await;
    }
}
