//! Process-wide registry of scale monitors.
//!
//! The platform may ask for a monitor from several threads at once, but each
//! (task hub, connection) pair must map to a single monitor for the life of
//! the process. The registry is an explicit value: create one at startup and
//! pass it to whatever needs monitors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::monitor::ScaleMonitor;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MonitorKey {
    task_hub: String,
    connection_name: String,
}

#[derive(Default)]
pub struct ScaleMonitorRegistry {
    monitors: Mutex<HashMap<MonitorKey, Arc<ScaleMonitor>>>,
}

impl ScaleMonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the monitor for the pair, building it with `create` on first use.
    ///
    /// `create` receives the task hub and connection name and must build a
    /// monitor for exactly that pair. The lock is held only across the lookup
    /// and, on a miss, the call to `create`; `create` must not do I/O. Metric
    /// fetches on the returned monitor run outside the lock.
    pub fn get_or_create<F>(&self, task_hub: &str, connection_name: &str, create: F) -> Arc<ScaleMonitor>
    where
        F: FnOnce(&str, &str) -> ScaleMonitor,
    {
        let key = MonitorKey {
            task_hub: task_hub.to_string(),
            connection_name: connection_name.to_string(),
        };
        let mut monitors = self.monitors.lock().unwrap_or_else(|e| e.into_inner());
        monitors
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(
                    target: "duroxide_host::scale",
                    task_hub = %task_hub,
                    connection = %connection_name,
                    "Creating scale monitor"
                );
                let monitor = create(task_hub, connection_name);
                debug_assert!(
                    monitor.task_hub() == task_hub && monitor.connection_name() == connection_name,
                    "scale monitor built for {}/{} stored under {task_hub}/{connection_name}",
                    monitor.task_hub(),
                    monitor.connection_name(),
                );
                Arc::new(monitor)
            })
            .clone()
    }

    pub fn get(&self, task_hub: &str, connection_name: &str) -> Option<Arc<ScaleMonitor>> {
        let key = MonitorKey {
            task_hub: task_hub.to_string(),
            connection_name: connection_name.to_string(),
        };
        self.monitors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.monitors.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
