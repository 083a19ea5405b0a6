use anyhow::{Context, Result};
use log::*;
use std::future::Future;
use std::path::PathBuf;

use control::Temperature;

/// Sink for forced setpoints. The controller never reads the actuator
/// back; its own sensor is not trusted.
pub trait Actuator: Send + 'static {
    fn write_setpoint(&mut self, setpoint: Temperature) -> impl Future<Output = Result<()>> + Send;
}

/// Writes the setpoint as text, e.g. into a file watched by a bridge to
/// the real thermostat.
#[derive(Debug, Clone)]
pub struct FileActuator {
    path: PathBuf,
}

impl FileActuator {
    pub fn new(path: PathBuf) -> Self {
        FileActuator { path }
    }
}

impl Actuator for FileActuator {
    async fn write_setpoint(&mut self, setpoint: Temperature) -> Result<()> {
        let value = f32::from(setpoint);
        tokio::fs::write(&self.path, format!("{:.1}\n", value))
            .await
            .with_context(|| format!("failed to write setpoint to {}", self.path.display()))?;
        debug!("Set {} to {:.1}°C", self.path.display(), value);
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every write and fails while `failing` is set.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingActuator {
        pub writes: Arc<Mutex<Vec<Temperature>>>,
        pub failing: Arc<Mutex<bool>>,
    }

    impl RecordingActuator {
        pub fn writes(&self) -> Vec<Temperature> {
            self.writes.lock().unwrap().clone()
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }
    }

    impl Actuator for RecordingActuator {
        async fn write_setpoint(&mut self, setpoint: Temperature) -> Result<()> {
            self.writes.lock().unwrap().push(setpoint);
            if *self.failing.lock().unwrap() {
                anyhow::bail!("actuator unreachable");
            }
            Ok(())
        }
    }
}
