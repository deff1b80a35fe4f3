//! Device and precision resolution
//!
//! A run's target hardware and numeric precision are either taken verbatim
//! from configuration or detected. Detection probes for an accelerator
//! (CUDA first, then Metal) and picks `bfloat16` when one is in use,
//! `float32` otherwise. The result is an immutable [`ResolvedSettings`];
//! the configuration it came from is never rewritten.

mod dtype;

pub use dtype::DType;

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, info};

/// Sentinel value asking for automatic detection
pub const DETECT: &str = "detect";

/// A concrete compute device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    /// Host CPU (the fallback)
    Cpu,
    /// NVIDIA GPU by ordinal
    Cuda(usize),
    /// Apple GPU by ordinal
    Metal(usize),
}

impl Device {
    /// Is this an accelerator?
    pub fn is_accelerator(&self) -> bool {
        !matches!(self, Device::Cpu)
    }

    /// Open the device in the inference backend
    pub fn to_candle(&self) -> Result<candle_core::Device> {
        let device = match self {
            Device::Cpu => candle_core::Device::Cpu,
            Device::Cuda(ordinal) => candle_core::Device::new_cuda(*ordinal)?,
            Device::Metal(ordinal) => candle_core::Device::new_metal(*ordinal)?,
        };
        Ok(device)
    }
}

impl FromStr for Device {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let (kind, ordinal) = match lower.split_once(':') {
            Some((kind, ordinal)) => {
                let ordinal = ordinal
                    .parse::<usize>()
                    .map_err(|_| Error::UnsupportedDevice(s.to_string()))?;
                (kind, ordinal)
            }
            None => (lower.as_str(), 0),
        };

        match kind {
            "cpu" if ordinal == 0 => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(ordinal)),
            "metal" | "mps" => Ok(Device::Metal(ordinal)),
            _ => Err(Error::UnsupportedDevice(s.to_string())),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(ordinal) => write!(f, "cuda:{}", ordinal),
            Device::Metal(ordinal) => write!(f, "metal:{}", ordinal),
        }
    }
}

/// Either a setting given verbatim or the `detect` sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting<T> {
    /// Resolve from hardware at run time
    Detect,
    /// Use this value as given
    Fixed(T),
}

/// Configured device: `detect` or a concrete device
pub type DeviceSetting = Setting<Device>;

/// Configured dtype: `detect` or a dtype name from the table
pub type DTypeSetting = Setting<DType>;

impl<T> Default for Setting<T> {
    fn default() -> Self {
        Setting::Detect
    }
}

impl<T: FromStr<Err = Error>> FromStr for Setting<T> {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case(DETECT) {
            Ok(Setting::Detect)
        } else {
            s.parse().map(Setting::Fixed)
        }
    }
}

impl<T: std::fmt::Display> Serialize for Setting<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T: FromStr<Err = Error>> Deserialize<'de> for Setting<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Setting<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Setting::Detect => f.write_str(DETECT),
            Setting::Fixed(value) => write!(f, "{}", value),
        }
    }
}

/// Source of truth for which accelerator, if any, is present
pub trait HardwareProbe {
    /// The accelerator to use when the device is detected, `None` for CPU
    fn accelerator(&self) -> Option<Device>;
}

/// Probes the accelerators the inference backend was built with
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HardwareProbe for SystemProbe {
    fn accelerator(&self) -> Option<Device> {
        if candle_core::utils::cuda_is_available() {
            Some(Device::Cuda(0))
        } else if candle_core::utils::metal_is_available() {
            Some(Device::Metal(0))
        } else {
            None
        }
    }
}

/// Reports a fixed answer; for hosts where probing is not wanted
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedProbe(pub Option<Device>);

impl HardwareProbe for FixedProbe {
    fn accelerator(&self) -> Option<Device> {
        self.0
    }
}

/// Device and dtype chosen for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedSettings {
    pub device: Device,
    pub dtype: DType,
}

impl ResolvedSettings {
    /// Resolve configured settings, probing hardware only when asked to
    pub fn resolve(device: DeviceSetting, dtype: DTypeSetting, probe: &dyn HardwareProbe) -> Self {
        let device = match device {
            Setting::Fixed(device) => device,
            Setting::Detect => {
                let detected = probe.accelerator().unwrap_or(Device::Cpu);
                debug!("Detected device: {}", detected);
                detected
            }
        };

        let dtype = match dtype {
            Setting::Fixed(dtype) => dtype,
            Setting::Detect if device.is_accelerator() => DType::BF16,
            Setting::Detect => DType::F32,
        };

        info!("Resolved device={} dtype={}", device, dtype);
        Self { device, dtype }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_device_left_unchanged() {
        for device in [Device::Cpu, Device::Cuda(1), Device::Metal(0)] {
            for probe in [FixedProbe(None), FixedProbe(Some(Device::Cuda(0)))] {
                let resolved =
                    ResolvedSettings::resolve(Setting::Fixed(device), Setting::Fixed(DType::F16), &probe);
                assert_eq!(resolved.device, device);
                assert_eq!(resolved.dtype, DType::F16);
            }
        }
    }

    #[test]
    fn test_detect_follows_probe() {
        let cpu = ResolvedSettings::resolve(Setting::Detect, Setting::Detect, &FixedProbe(None));
        assert_eq!(cpu.device, Device::Cpu);
        assert_eq!(cpu.dtype, DType::F32);

        let gpu = ResolvedSettings::resolve(
            Setting::Detect,
            Setting::Detect,
            &FixedProbe(Some(Device::Cuda(0))),
        );
        assert_eq!(gpu.device, Device::Cuda(0));
        assert_eq!(gpu.dtype, DType::BF16);
    }

    #[test]
    fn test_detect_dtype_uses_configured_device() {
        // A configured accelerator gets reduced precision even when the probe sees none
        let resolved = ResolvedSettings::resolve(
            Setting::Fixed(Device::Metal(0)),
            Setting::Detect,
            &FixedProbe(None),
        );
        assert_eq!(resolved.dtype, DType::BF16);
    }

    #[test]
    fn test_system_probe_is_consistent() {
        let resolved = ResolvedSettings::resolve(Setting::Detect, Setting::Detect, &SystemProbe);
        match SystemProbe.accelerator() {
            Some(device) => assert_eq!(resolved.device, device),
            None => assert_eq!(resolved.device, Device::Cpu),
        }
    }

    #[test]
    fn test_device_parsing() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("cuda".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("CUDA:2".parse::<Device>().unwrap(), Device::Cuda(2));
        assert_eq!("mps".parse::<Device>().unwrap(), Device::Metal(0));
        assert!(matches!(
            "tpu".parse::<Device>(),
            Err(Error::UnsupportedDevice(_))
        ));
        assert!("cuda:x".parse::<Device>().is_err());
        assert!(matches!("gpu".parse::<Device>(), Err(Error::UnsupportedDevice(_))));
    }

    #[test]
    fn test_setting_parsing() {
        assert_eq!("detect".parse::<DeviceSetting>().unwrap(), Setting::Detect);
        assert_eq!(
            "bf16".parse::<DTypeSetting>().unwrap(),
            Setting::Fixed(DType::BF16)
        );
        assert_eq!(Setting::Fixed(Device::Cuda(0)).to_string(), "cuda:0");
    }
}
