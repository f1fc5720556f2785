/*!
 * Collaborator seams.
 *
 * The coordinator layer does not load descriptors itself; it receives
 * them. These traits are the seams for the two collaborators that
 * produce descriptors: a driver catalog resolving well-known device
 * models to prebuilt descriptors, and a persistence store for
 * user-edited ones.
 */
use async_trait::async_trait;

use avlink_core::types::Id;

use crate::descriptor::DeviceDescriptor;
use crate::error::Result;

/// Resolves driver ids to prebuilt device descriptors
///
/// A driver is a canned descriptor for a known device model, e.g.
/// "denon_avr" or "orei_uhd_matrix". Implementations typically bundle
/// these as data files.
#[async_trait]
pub trait DriverCatalog: Send + Sync {
    /// Resolve a driver id to its descriptor
    ///
    /// The returned descriptor still carries the driver's placeholder
    /// identity; callers assign the real device id and transport before
    /// handing it to a coordinator.
    async fn resolve_driver(&self, driver_id: &str) -> Result<DeviceDescriptor>;

    /// Driver ids this catalog can resolve
    async fn driver_ids(&self) -> Vec<String>;
}

/// Persistence for user-edited device descriptors
#[async_trait]
pub trait DescriptorStore: Send + Sync {
    /// Load a stored descriptor, if one exists
    async fn load(&self, device_id: &Id) -> Result<Option<DeviceDescriptor>>;

    /// Persist a descriptor, replacing any previous version
    async fn save(&self, descriptor: &DeviceDescriptor) -> Result<()>;

    /// Remove a stored descriptor
    async fn remove(&self, device_id: &Id) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use crate::descriptor::{NetworkConfig, TransportConfig};
    use crate::error::DeviceError;

    struct MemoryStore {
        descriptors: Mutex<HashMap<Id, DeviceDescriptor>>,
    }

    #[async_trait]
    impl DescriptorStore for MemoryStore {
        async fn load(&self, device_id: &Id) -> Result<Option<DeviceDescriptor>> {
            Ok(self.descriptors.lock().unwrap().get(device_id).cloned())
        }

        async fn save(&self, descriptor: &DeviceDescriptor) -> Result<()> {
            self.descriptors
                .lock()
                .unwrap()
                .insert(descriptor.device_id.clone(), descriptor.clone());
            Ok(())
        }

        async fn remove(&self, device_id: &Id) -> Result<()> {
            self.descriptors
                .lock()
                .unwrap()
                .remove(device_id)
                .map(|_| ())
                .ok_or_else(|| DeviceError::Config(format!("No descriptor for {}", device_id)))
        }
    }

    fn descriptor(id: &str) -> DeviceDescriptor {
        DeviceDescriptor::new(
            id.into(),
            "Test Device",
            TransportConfig::Tcp(NetworkConfig {
                host: "localhost".to_string(),
                port: 8000,
                timeout_secs: 1.0,
                persistent_connection: true,
                reconnect_interval_secs: 30.0,
            }),
        )
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let store = MemoryStore {
            descriptors: Mutex::new(HashMap::new()),
        };

        assert!(store.load(&"tv-1".into()).await.unwrap().is_none());
        store.save(&descriptor("tv-1")).await.unwrap();
        assert!(store.load(&"tv-1".into()).await.unwrap().is_some());
        store.remove(&"tv-1".into()).await.unwrap();
        assert!(store.load(&"tv-1".into()).await.unwrap().is_none());
    }
}
