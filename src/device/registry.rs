use indexmap::IndexMap;

use crate::device::constants::DEFAULT_DEVICE_NAME;
use crate::device::types::PeripheralHandle;

/// Peripherals found during the current scan, in the order they were first seen.
#[derive(Debug, Clone)]
pub struct DeviceRegistry {
    devices: IndexMap<String, PeripheralHandle>,
    fallback_name: String,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        DeviceRegistry::new(DEFAULT_DEVICE_NAME)
    }
}

impl DeviceRegistry {
    pub fn new(fallback_name: impl Into<String>) -> Self {
        DeviceRegistry {
            devices: IndexMap::new(),
            fallback_name: fallback_name.into(),
        }
    }

    pub fn clear(&mut self) {
        self.devices.clear();
    }

    /// Returns true if this address was not known yet.
    pub fn add(&mut self, handle: PeripheralHandle) -> bool {
        if self.devices.contains_key(&handle.address) {
            return false;
        }

        self.devices.insert(handle.address.clone(), handle);
        true
    }

    pub fn all(&self) -> impl Iterator<Item = &PeripheralHandle> {
        self.devices.values()
    }

    pub fn get(&self, address: &str) -> Option<&PeripheralHandle> {
        self.devices.get(address)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn display_name<'a>(&'a self, handle: &'a PeripheralHandle) -> &'a str {
        match handle.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.fallback_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(address: &str, name: Option<&str>) -> PeripheralHandle {
        PeripheralHandle::new(format!("id-{}", address), name.map(String::from), address)
    }

    #[test]
    fn add_is_idempotent_per_address() {
        let mut registry = DeviceRegistry::default();

        assert!(registry.add(handle("AA:BB:CC:DD:EE:01", Some("first"))));
        assert!(!registry.add(handle("AA:BB:CC:DD:EE:01", Some("renamed"))));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("AA:BB:CC:DD:EE:01").and_then(|h| h.name.as_deref()), Some("first"));
    }

    #[test]
    fn keeps_insertion_order() {
        let mut registry = DeviceRegistry::default();
        registry.add(handle("03", None));
        registry.add(handle("01", None));
        registry.add(handle("02", None));
        registry.add(handle("01", None));

        let addresses: Vec<&str> = registry.all().map(|h| h.address.as_str()).collect();
        assert_eq!(addresses, vec!["03", "01", "02"]);
    }

    #[test]
    fn clear_forgets_everything() {
        let mut registry = DeviceRegistry::default();
        registry.add(handle("01", None));
        registry.clear();

        assert!(registry.is_empty());
        assert!(registry.add(handle("01", None)));
    }

    #[test]
    fn display_name_falls_back() {
        let registry = DeviceRegistry::new("Vacuum");
        assert_eq!(registry.display_name(&handle("01", None)), "Vacuum");
        assert_eq!(registry.display_name(&handle("01", Some(""))), "Vacuum");
        assert_eq!(registry.display_name(&handle("01", Some("Robot"))), "Robot");
    }
}
