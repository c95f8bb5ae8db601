//! Audio Device Enumeration and Lookup
//!
//! Devices are identified by their cpal name. `None` always means the host
//! default for that direction.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StreamConfig;
use crate::error::{EngineError, EngineResult};

/// Direction of an audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceType {
    Input,
    Output,
}

/// Description of an audio device, for listing in a UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioDevice {
    /// Identifier passed back to `select_devices` (the cpal name)
    pub id: String,

    /// Human-readable device name
    pub name: String,

    pub device_type: DeviceType,

    /// Whether this is the system default device
    pub is_default: bool,

    /// Supported sample rates among the common ones (may be empty if
    /// querying failed)
    pub sample_rates: Vec<u32>,

    /// Maximum supported channels
    pub max_channels: u16,
}

/// Rates worth offering in a device picker
const COMMON_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

impl AudioDevice {
    /// Enumerate all available audio devices, inputs first
    pub fn enumerate_all() -> EngineResult<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let mut devices = Vec::new();

        for device_type in [DeviceType::Input, DeviceType::Output] {
            let default_name = default_device(&host, device_type).and_then(|d| d.name().ok());
            let listed = match device_type {
                DeviceType::Input => host.input_devices().map(|d| d.collect::<Vec<_>>()),
                DeviceType::Output => host.output_devices().map(|d| d.collect::<Vec<_>>()),
            };
            let Ok(listed) = listed else {
                debug!("Could not list {:?} devices", device_type);
                continue;
            };
            devices.extend(
                listed
                    .iter()
                    .filter_map(|d| Self::describe(d, device_type, default_name.as_deref()).ok()),
            );
        }

        if devices.is_empty() {
            return Err(EngineError::NoDevicesFound);
        }
        Ok(devices)
    }

    fn describe(
        device: &cpal::Device,
        device_type: DeviceType,
        default_name: Option<&str>,
    ) -> EngineResult<Self> {
        let name = device
            .name()
            .map_err(|e| EngineError::DeviceNotFound(e.to_string()))?;

        let ranges = match device_type {
            DeviceType::Input => device
                .supported_input_configs()
                .map(|c| c.collect::<Vec<_>>()),
            DeviceType::Output => device
                .supported_output_configs()
                .map(|c| c.collect::<Vec<_>>()),
        }
        .unwrap_or_default();

        let max_channels = ranges.iter().map(|r| r.channels()).max().unwrap_or(2);
        let sample_rates = COMMON_RATES
            .into_iter()
            .filter(|&rate| {
                ranges
                    .iter()
                    .any(|r| (r.min_sample_rate().0..=r.max_sample_rate().0).contains(&rate))
            })
            .collect();

        Ok(AudioDevice {
            id: name.clone(),
            is_default: default_name == Some(name.as_str()),
            name,
            device_type,
            sample_rates,
            max_channels,
        })
    }
}

fn default_device(host: &cpal::Host, device_type: DeviceType) -> Option<cpal::Device> {
    match device_type {
        DeviceType::Input => host.default_input_device(),
        DeviceType::Output => host.default_output_device(),
    }
}

/// Find a device by id, or the host default when `id` is `None`
pub fn resolve_device(device_type: DeviceType, id: Option<&str>) -> EngineResult<cpal::Device> {
    let host = cpal::default_host();
    let Some(id) = id else {
        return default_device(&host, device_type).ok_or(EngineError::NoDevicesFound);
    };

    let mut candidates = match device_type {
        DeviceType::Input => host.input_devices(),
        DeviceType::Output => host.output_devices(),
    }
    .map_err(|e| EngineError::DeviceError(e.to_string()))?;

    candidates
        .find(|d| d.name().map(|n| n == id).unwrap_or(false))
        .ok_or_else(|| EngineError::DeviceNotFound(id.to_string()))
}

/// Check that `device` can run `config` as f32 in the given direction
pub fn check_support(
    device: &cpal::Device,
    device_type: DeviceType,
    config: &StreamConfig,
) -> EngineResult<()> {
    let ranges = match device_type {
        DeviceType::Input => device
            .supported_input_configs()
            .map(|c| c.collect::<Vec<_>>()),
        DeviceType::Output => device
            .supported_output_configs()
            .map(|c| c.collect::<Vec<_>>()),
    }
    .map_err(|e| EngineError::DeviceError(e.to_string()))?;

    let supported = ranges.iter().any(|r| {
        r.sample_format() == cpal::SampleFormat::F32
            && r.channels() >= config.channels
            && (r.min_sample_rate().0..=r.max_sample_rate().0).contains(&config.sample_rate)
    });
    if supported {
        Ok(())
    } else {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".into());
        Err(EngineError::DeviceError(format!(
            "{name} does not support {} Hz / {} ch / f32 for {:?}",
            config.sample_rate, config.channels, device_type
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_type_serialization() {
        let input = DeviceType::Input;
        let json = serde_json::to_string(&input).unwrap();
        let deserialized: DeviceType = serde_json::from_str(&json).unwrap();
        assert_eq!(input, deserialized);
    }

    #[test]
    fn test_audio_device_serialization() {
        let device = AudioDevice {
            id: "test-id".to_string(),
            name: "Test Device".to_string(),
            device_type: DeviceType::Output,
            is_default: true,
            sample_rates: vec![44100, 48000],
            max_channels: 2,
        };

        let json = serde_json::to_string(&device).unwrap();
        let deserialized: AudioDevice = serde_json::from_str(&json).unwrap();
        assert_eq!(device, deserialized);
    }

    // Note: Hardware-dependent tests are marked with #[ignore]
    // Run them with: cargo test -- --ignored

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_enumerate_all_devices() {
        let devices = AudioDevice::enumerate_all().unwrap();
        assert!(!devices.is_empty());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_resolve_default_output() {
        let device = resolve_device(DeviceType::Output, None).unwrap();
        assert!(device.name().is_ok());
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_resolve_unknown_device() {
        let result = resolve_device(DeviceType::Input, Some("no such device, surely"));
        assert!(matches!(result, Err(EngineError::DeviceNotFound(_))));
    }
}
