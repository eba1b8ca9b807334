use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use noisewatch_foundation::AudioError;

pub struct DeviceManager {
    host: Host,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host.id()
    }

    /// Open the named input device, or the host default when `name` is
    /// `None`. A missing device is a hard error; there is no fallback
    /// chain, the caller picked the device on purpose.
    pub fn open_device(&self, name: Option<&str>) -> Result<Device, AudioError> {
        match name {
            Some(wanted) => {
                if let Ok(inputs) = self.host.input_devices() {
                    for device in inputs {
                        if device.name().ok().as_deref() == Some(wanted) {
                            return Ok(device);
                        }
                    }
                }
                Err(AudioError::DeviceNotFound {
                    name: Some(wanted.to_string()),
                })
            }
            None => self
                .host
                .default_input_device()
                .ok_or(AudioError::DeviceNotFound { name: None }),
        }
    }

    pub fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        if let Ok(inputs) = self.host.input_devices() {
            for device in inputs {
                if let Ok(name) = device.name() {
                    devices.push(DeviceInfo {
                        name,
                        is_default: false,
                    });
                }
            }
        }

        // Mark default
        if let Some(default) = self.host.default_input_device() {
            if let Ok(default_name) = default.name() {
                for device in &mut devices {
                    if device.name == default_name {
                        device.is_default = true;
                    }
                }
            }
        }

        devices
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumeration_works_without_hardware() {
        // May be empty on headless hosts; must not panic either way.
        let manager = DeviceManager::new();
        let devices = manager.enumerate_devices();
        assert!(devices.iter().filter(|d| d.is_default).count() <= 1);
    }

    #[test]
    fn unknown_device_name_is_reported_back() {
        let manager = DeviceManager::new();
        let err = manager
            .open_device(Some("noisewatch-no-such-device"))
            .err()
            .expect("device does not exist");
        match err {
            AudioError::DeviceNotFound { name } => {
                assert_eq!(name.as_deref(), Some("noisewatch-no-such-device"));
            }
            other => panic!("expected DeviceNotFound, got {:?}", other),
        }
    }
}
