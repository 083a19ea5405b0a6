use log::*;
use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};

use control::{
    Configuration, Controller, ElectricityPrice, HvacMode, Reading, Sample, Status, Temperature,
    WriteOutcome,
};

use crate::heating::Actuator;

#[derive(Debug, Clone)]
pub enum RoomEvent {
    Measurement(Reading<Temperature>),
    Price(Reading<ElectricityPrice>),
    Configure(Configuration),
    SetMode(HvacMode),
    Shutdown,
}

/// One room's controller together with its actuator. Events are drained
/// from a single queue, so evaluations never overlap.
pub struct Room<A> {
    id: String,
    controller: Controller,
    actuator: A,
    status: watch::Sender<Status>,
}

impl<A: Actuator> Room<A> {
    pub fn new(id: String, controller: Controller, actuator: A) -> (Self, watch::Receiver<Status>) {
        let (status, receiver) = watch::channel(controller.status());
        let room = Room {
            id,
            controller,
            actuator,
            status,
        };
        (room, receiver)
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<RoomEvent>) {
        info!("[{}] Controller activated", self.id);
        while let Some(event) = events.recv().await {
            trace!("[{}] Received event {:?}", self.id, event);
            match event {
                RoomEvent::Measurement(reading) => {
                    self.controller.update(Sample::Temperature(reading));
                }
                RoomEvent::Price(reading) => {
                    self.controller.update(Sample::Price(reading));
                }
                RoomEvent::Configure(config) => {
                    if let Err(err) = self.controller.configure(config) {
                        error!("[{}] Rejected configuration: {:#}", self.id, err);
                        continue;
                    }
                }
                RoomEvent::SetMode(mode) => self.controller.set_mode(mode),
                RoomEvent::Shutdown => break,
            }
            self.evaluate().await;
        }
        info!("[{}] Controller deactivated", self.id);
    }

    async fn evaluate(&mut self) {
        let now = OffsetDateTime::now_utc();
        if let Some(setpoint) = self.controller.tick(now) {
            let outcome = match self.actuator.write_setpoint(setpoint).await {
                Ok(()) => {
                    info!("[{}] Setpoint {:?} written", self.id, setpoint);
                    WriteOutcome::Written
                }
                Err(err) => {
                    error!("[{}] Failed to write setpoint: {:#}", self.id, err);
                    WriteOutcome::Failed
                }
            };
            self.controller
                .record_write(setpoint, outcome, OffsetDateTime::now_utc());
        }
        self.status.send_replace(self.controller.status());
    }
}
