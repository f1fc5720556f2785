/*!
 * Coordinator registry.
 *
 * Holds every active [`DeviceCoordinator`] keyed by device id and fans
 * lifecycle events out to subscribers. The registry is the one place
 * that knows about all devices; integrations hold on to individual
 * coordinators.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use avlink_core::types::Id;

use crate::coordinator::DeviceCoordinator;
use crate::error::{DeviceError, Result};

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Registry lifecycle events
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A coordinator was registered
    CoordinatorAdded(Id),
    /// A coordinator was removed
    CoordinatorRemoved(Id),
}

/// Registry of active device coordinators
#[derive(Debug)]
pub struct CoordinatorRegistry {
    coordinators: RwLock<HashMap<Id, Arc<DeviceCoordinator>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for CoordinatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            coordinators: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Id, Arc<DeviceCoordinator>>> {
        self.coordinators
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Id, Arc<DeviceCoordinator>>> {
        self.coordinators
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a coordinator; duplicate ids are rejected
    pub fn register(&self, coordinator: Arc<DeviceCoordinator>) -> Result<()> {
        let id = coordinator.device_id().clone();
        {
            let mut coordinators = self.write();
            if coordinators.contains_key(&id) {
                return Err(DeviceError::Config(format!(
                    "Device {} is already registered",
                    id
                )));
            }
            coordinators.insert(id.clone(), coordinator);
        }

        info!("Registered device {}", id);
        let _ = self.events.send(RegistryEvent::CoordinatorAdded(id));
        Ok(())
    }

    /// Remove a coordinator, returning it if present
    ///
    /// The caller is responsible for disconnecting it.
    pub fn unregister(&self, id: &Id) -> Option<Arc<DeviceCoordinator>> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            info!("Unregistered device {}", id);
            let _ = self.events.send(RegistryEvent::CoordinatorRemoved(id.clone()));
        }
        removed
    }

    /// Look up a coordinator by device id
    pub fn get(&self, id: &Id) -> Option<Arc<DeviceCoordinator>> {
        self.read().get(id).cloned()
    }

    /// Whether a device id is registered
    pub fn has(&self, id: &Id) -> bool {
        self.read().contains_key(id)
    }

    /// All registered device ids
    pub fn ids(&self) -> Vec<Id> {
        self.read().keys().cloned().collect()
    }

    /// Number of registered coordinators
    pub fn count(&self) -> usize {
        self.read().len()
    }

    /// Subscribe to registry lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Connect every registered device
    ///
    /// Per-device failures are logged; returns how many devices ended up
    /// connected.
    pub async fn connect_all(&self) -> usize {
        let coordinators: Vec<Arc<DeviceCoordinator>> = self.read().values().cloned().collect();

        let mut connected = 0;
        for coordinator in coordinators {
            if coordinator.connect().await {
                connected += 1;
            } else {
                warn!("Could not connect to {}", coordinator.name());
            }
        }
        debug!("Connected {} of {} devices", connected, self.count());
        connected
    }

    /// Disconnect every registered device
    pub async fn disconnect_all(&self) {
        let coordinators: Vec<Arc<DeviceCoordinator>> = self.read().values().cloned().collect();
        for coordinator in coordinators {
            coordinator.disconnect().await;
        }
    }
}
