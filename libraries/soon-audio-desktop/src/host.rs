//! Audio driver selection (system default, ASIO, JACK)

use crate::error::{AudioError, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Audio driver to open the output on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// System default (WASAPI, CoreAudio, ALSA)
    #[default]
    Default,

    /// ASIO (Windows only)
    #[cfg(all(target_os = "windows", feature = "asio"))]
    Asio,

    /// JACK Audio Connection Kit
    #[cfg(feature = "jack")]
    Jack,
}

impl Driver {
    /// Every driver compiled into this build
    pub fn all() -> Vec<Driver> {
        vec![
            Driver::Default,
            #[cfg(all(target_os = "windows", feature = "asio"))]
            Driver::Asio,
            #[cfg(feature = "jack")]
            Driver::Jack,
        ]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Default => {
                #[cfg(target_os = "windows")]
                return "WASAPI";

                #[cfg(target_os = "macos")]
                return "CoreAudio";

                #[cfg(target_os = "linux")]
                return "ALSA";

                #[cfg(not(any(
                    target_os = "windows",
                    target_os = "macos",
                    target_os = "linux"
                )))]
                return "Default";
            }

            #[cfg(all(target_os = "windows", feature = "asio"))]
            Self::Asio => "ASIO",

            #[cfg(feature = "jack")]
            Self::Jack => "JACK",
        }
    }

    /// Open the cpal host for this driver
    pub fn host(self) -> Result<cpal::Host> {
        match self {
            Self::Default => Ok(cpal::default_host()),

            #[cfg(all(target_os = "windows", feature = "asio"))]
            Self::Asio => cpal::host_from_id(cpal::HostId::Asio)
                .map_err(|e| AudioError::DeviceError(e.to_string())),

            #[cfg(feature = "jack")]
            Self::Jack => {
                let id = cpal::available_hosts()
                    .into_iter()
                    .find(|id| matches!(id, cpal::HostId::Jack))
                    .ok_or_else(|| AudioError::DeviceError("JACK is not running".into()))?;
                cpal::host_from_id(id).map_err(|e| AudioError::DeviceError(e.to_string()))
            }
        }
    }

    pub fn is_available(self) -> bool {
        self.host().is_ok()
    }

    /// Default output device and its preferred stream config
    pub fn default_output(self) -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
        let device = self
            .host()?
            .default_output_device()
            .ok_or(AudioError::DeviceNotFound)?;
        let config = device.default_output_config()?;
        Ok((device, config))
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Driver {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "default" | "system" => Ok(Driver::Default),
            #[cfg(all(target_os = "windows", feature = "asio"))]
            "asio" => Ok(Driver::Asio),
            #[cfg(feature = "jack")]
            "jack" => Ok(Driver::Jack),
            other => Err(AudioError::DeviceError(format!(
                "unknown or unsupported driver '{other}'"
            ))),
        }
    }
}

/// What `inspect` reports about a driver
#[derive(Debug, Clone, Serialize)]
pub struct DriverInfo {
    pub driver: Driver,
    pub name: &'static str,
    pub available: bool,
    /// Default output sample rate, when a device is present
    pub sample_rate: Option<u32>,
    /// Default output channel count, when a device is present
    pub channels: Option<u16>,
}

/// Probe every compiled-in driver
///
/// Only the default device is opened; ASIO and JACK drivers misbehave when
/// enumerated repeatedly.
pub fn probe_drivers() -> Vec<DriverInfo> {
    Driver::all()
        .into_iter()
        .map(|driver| {
            let output = driver.default_output().ok();
            DriverInfo {
                driver,
                name: driver.name(),
                available: driver.is_available(),
                sample_rate: output.as_ref().map(|(_, config)| config.sample_rate()),
                channels: output.as_ref().map(|(_, config)| config.channels()),
            }
        })
        .collect()
}
