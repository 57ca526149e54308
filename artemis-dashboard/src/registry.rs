/**
 * DEVICE REGISTRY - Source de vérité des terminaux suivis
 *
 * RÔLE : Map deviceId → Device, unique propriétaire de l'état des devices.
 * Le rendu (cartes, compteurs, marqueurs) est toujours dérivé d'ici.
 *
 * INVARIANTS :
 * - un deviceId correspond à au plus une entrée
 * - l'itération suit l'ordre d'enregistrement (ordre d'affichage des cartes)
 */

use std::collections::HashMap;

use crate::models::{Device, DeviceId};

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<DeviceId, Device>,
    order: Vec<DeviceId>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insère le device s'il est absent. Retourne false (sans rien écraser) si l'id existe déjà.
    pub fn insert_if_absent(&mut self, device: Device) -> bool {
        if self.devices.contains_key(&device.device_id) {
            return false;
        }
        self.order.push(device.device_id.clone());
        self.devices.insert(device.device_id.clone(), device);
        true
    }

    pub fn remove(&mut self, device_id: &str) -> Option<Device> {
        let removed = self.devices.remove(device_id)?;
        self.order.retain(|id| id != device_id);
        Some(removed)
    }

    pub fn get(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn get_mut(&mut self, device_id: &str) -> Option<&mut Device> {
        self.devices.get_mut(device_id)
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Devices dans l'ordre d'enregistrement
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.order.iter().filter_map(|id| self.devices.get(id))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.devices.values().filter(|d| d.online).count()
    }
}
