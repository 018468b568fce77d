//! Identifier Registry: maps textual `(device, control)` and group names to
//! stable small integer ids, creating rows on first sighting.

use std::collections::HashMap;

use crate::error::EngineError;
use crate::ids::{ChannelId, DeviceId, GroupId};
use crate::store::Store;

#[derive(Default)]
pub struct Registry {
    devices: HashMap<String, DeviceId>,
    channels: HashMap<(String, String), ChannelId>,
    groups: HashMap<String, GroupId>,
}

impl Registry {
    /// Populate both maps from a full scan of `devices` and `channels`, and
    /// resolve every configured group name against `groups`, creating any
    /// that are missing.
    pub fn load(store: &Store, group_names: &[String]) -> Result<(Self, HashMap<String, GroupId>), EngineError> {
        let mut registry = Registry::default();

        for (name, id) in store.scan_devices()? {
            registry.devices.insert(name, id);
        }
        for (key, id) in store.scan_channels()? {
            registry.channels.insert(key, id);
        }
        for (name, id) in store.scan_groups()? {
            registry.groups.insert(name, id);
        }

        let mut resolved_groups = HashMap::new();
        for name in group_names {
            let id = registry.resolve_group(store, name)?;
            resolved_groups.insert(name.clone(), id);
        }

        Ok((registry, resolved_groups))
    }

    pub fn resolve_device(&mut self, store: &Store, name: &str) -> Result<DeviceId, EngineError> {
        if let Some(id) = self.devices.get(name) {
            return Ok(*id);
        }
        let id = store.insert_device(name)?;
        self.devices.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn resolve_channel(
        &mut self,
        store: &Store,
        device: &str,
        control: &str,
    ) -> Result<ChannelId, EngineError> {
        let key = (device.to_string(), control.to_string());
        if let Some(id) = self.channels.get(&key) {
            return Ok(*id);
        }
        let id = store.insert_channel(device, control)?;
        self.channels.insert(key, id);
        Ok(id)
    }

    fn resolve_group(&mut self, store: &Store, name: &str) -> Result<GroupId, EngineError> {
        if let Some(id) = self.groups.get(name) {
            return Ok(*id);
        }
        let id = store.insert_group(name)?;
        self.groups.insert(name.to_string(), id);
        Ok(id)
    }
}
