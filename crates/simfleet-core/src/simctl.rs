//! Interface to Apple's `xcrun simctl` command-line tool.
//!
//! Everything this crate knows about the simulator fleet comes through
//! here: typed listings of devices, runtimes, and device types, plus the
//! status-only commands used to shut down, delete, and create simulators.
//!
//! # Requirements
//!
//! Xcode must be installed for `xcrun simctl` to be available.
//!
//! # Example
//!
//! ```no_run
//! use simfleet_core::simctl::Simctl;
//!
//! let devices = Simctl::list_devices().unwrap();
//! for device in &devices {
//!     println!("{}: {} ({})", device.name, device.udid, device.state);
//! }
//! ```

use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device state reported by simctl for a fully stopped simulator. Any
/// other value ("Booted", "Booting", "Creating", ...) counts as running.
pub const STATE_SHUTDOWN: &str = "Shutdown";

/// Errors that can occur when interacting with simctl.
#[derive(Error, Debug)]
pub enum SimctlError {
    /// A simctl command exited with a non-zero status. The payload holds
    /// the command's combined stdout and stderr.
    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    /// Failed to parse JSON output from simctl.
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// An I/O error occurred while executing the command.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A simulator device as reported by `simctl list devices -j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorDevice {
    /// The unique device identifier (UDID) for this simulator.
    pub udid: String,

    /// The human-readable name of the device (e.g., "iPhone 15 Pro").
    pub name: String,

    /// The current state of the device (e.g., "Booted", "Shutdown").
    pub state: String,

    /// The device type identifier, when simctl reports one.
    #[serde(rename = "deviceTypeIdentifier")]
    pub device_type: Option<String>,
}

impl SimulatorDevice {
    /// Whether the device is anything other than fully shut down.
    pub fn is_running(&self) -> bool {
        self.state != STATE_SHUTDOWN
    }
}

/// An installed runtime image as reported by `simctl list runtimes -j`.
///
/// Availability has been spelled two ways across Xcode releases: older
/// simctl emits `"availability": "(available)"`, newer simctl emits
/// `"isAvailable": true`. Both forms are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorRuntime {
    /// Runtime identifier, e.g. `com.apple.CoreSimulator.SimRuntime.iOS-17-0`.
    pub identifier: String,

    /// Display name, e.g. "iOS 17.0".
    pub name: Option<String>,

    /// OS version string, e.g. "17.0".
    pub version: Option<String>,

    /// Legacy availability string, e.g. "(available)".
    pub availability: Option<String>,

    /// Modern availability flag.
    #[serde(rename = "isAvailable")]
    pub is_available: Option<bool>,
}

impl SimulatorRuntime {
    /// Whether this runtime is usable for creating simulators.
    pub fn is_available(&self) -> bool {
        match self.is_available {
            Some(flag) => flag,
            None => self.availability.as_deref() == Some("(available)"),
        }
    }
}

/// A hardware profile as reported by `simctl list devicetypes -j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorDeviceType {
    /// Device type identifier, e.g.
    /// `com.apple.CoreSimulator.SimDeviceType.iPhone-15-Pro`.
    pub identifier: String,

    /// Display name, e.g. "iPhone 15 Pro".
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct DeviceList {
    devices: std::collections::HashMap<String, Vec<SimulatorDevice>>,
}

#[derive(Debug, Deserialize)]
struct RuntimeList {
    runtimes: Vec<SimulatorRuntime>,
}

#[derive(Debug, Deserialize)]
struct DeviceTypeList {
    devicetypes: Vec<SimulatorDeviceType>,
}

/// Wrapper for `xcrun simctl` commands.
///
/// Provides static methods for querying and mutating the simulator
/// fleet. All methods are synchronous and block on the subprocess.
pub struct Simctl;

impl Simctl {
    /// Lists all simulator devices across every installed runtime.
    ///
    /// Queries `xcrun simctl list devices -j` and flattens the
    /// per-runtime groupings into a single vector.
    ///
    /// # Errors
    ///
    /// - [`SimctlError::Io`] if the command fails to execute
    /// - [`SimctlError::CommandFailed`] if simctl returns a non-zero exit code
    /// - [`SimctlError::JsonParse`] if the output cannot be parsed as JSON
    pub fn list_devices() -> Result<Vec<SimulatorDevice>, SimctlError> {
        let output = Command::new("xcrun")
            .args(["simctl", "list", "devices", "-j"])
            .output()?;

        if !output.status.success() {
            return Err(SimctlError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Self::parse_device_list(&output.stdout)
    }

    /// Lists all installed runtime images, available or not.
    ///
    /// Callers that create simulators should filter with
    /// [`SimulatorRuntime::is_available`].
    pub fn list_runtimes() -> Result<Vec<SimulatorRuntime>, SimctlError> {
        let output = Command::new("xcrun")
            .args(["simctl", "list", "runtimes", "-j"])
            .output()?;

        if !output.status.success() {
            return Err(SimctlError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Self::parse_runtime_list(&output.stdout)
    }

    /// Lists all known device types.
    pub fn list_device_types() -> Result<Vec<SimulatorDeviceType>, SimctlError> {
        let output = Command::new("xcrun")
            .args(["simctl", "list", "devicetypes", "-j"])
            .output()?;

        if !output.status.success() {
            return Err(SimctlError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Self::parse_device_type_list(&output.stdout)
    }

    /// Runs the plain-text `simctl list devices` used as a readiness
    /// probe for CoreSimulatorService.
    ///
    /// Returns the raw stdout. The service is known to throw transient
    /// errors right after an Xcode version switch, so callers treat a
    /// [`SimctlError::CommandFailed`] the same as empty output: not
    /// ready yet.
    pub fn probe_device_listing() -> Result<String, SimctlError> {
        let output = Command::new("xcrun")
            .args(["simctl", "list", "devices"])
            .output()?;

        if !output.status.success() {
            return Err(SimctlError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Deletes all simulators whose runtime or device type is no longer
    /// installed (`simctl delete unavailable`).
    pub fn delete_unavailable() -> Result<(), SimctlError> {
        let output = Command::new("xcrun")
            .args(["simctl", "delete", "unavailable"])
            .output()?;

        if !output.status.success() {
            return Err(SimctlError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Ok(())
    }

    /// Shuts down the simulator with the given UDID.
    pub fn shutdown(udid: &str) -> Result<(), SimctlError> {
        let output = Command::new("xcrun")
            .args(["simctl", "shutdown", udid])
            .output()?;

        if !output.status.success() {
            return Err(SimctlError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Ok(())
    }

    /// Deletes the simulator with the given UDID.
    pub fn delete(udid: &str) -> Result<(), SimctlError> {
        let output = Command::new("xcrun")
            .args(["simctl", "delete", udid])
            .output()?;

        if !output.status.success() {
            return Err(SimctlError::CommandFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        Ok(())
    }

    /// Creates a new simulator from a device type and runtime pairing.
    ///
    /// On failure the [`SimctlError::CommandFailed`] payload carries the
    /// command's combined stdout and stderr so the caller can log the
    /// full diagnostic output.
    pub fn create(
        name: &str,
        device_type_identifier: &str,
        runtime_identifier: &str,
    ) -> Result<(), SimctlError> {
        let output = Command::new("xcrun")
            .args([
                "simctl",
                "create",
                name,
                device_type_identifier,
                runtime_identifier,
            ])
            .output()?;

        if !output.status.success() {
            let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(SimctlError::CommandFailed(combined));
        }

        Ok(())
    }

    /// Returns the full `simctl list` dump for post-mortem diagnostics.
    ///
    /// Best-effort: used only on the fatal error path, where even a
    /// partial dump is better than none, so stderr is appended to the
    /// result rather than treated as a failure.
    pub fn dump_listing() -> Result<String, SimctlError> {
        let output = Command::new("xcrun").args(["simctl", "list"]).output()?;

        let mut dump = String::from_utf8_lossy(&output.stdout).to_string();
        dump.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(dump)
    }

    /// Parses `simctl list devices -j` output into a flat device vector.
    ///
    /// Exposed primarily for testing against fixture JSON.
    pub fn parse_device_list(json: &[u8]) -> Result<Vec<SimulatorDevice>, SimctlError> {
        let list: DeviceList = serde_json::from_slice(json)?;
        Ok(list.devices.into_values().flatten().collect())
    }

    /// Parses `simctl list runtimes -j` output.
    pub fn parse_runtime_list(json: &[u8]) -> Result<Vec<SimulatorRuntime>, SimctlError> {
        let list: RuntimeList = serde_json::from_slice(json)?;
        Ok(list.runtimes)
    }

    /// Parses `simctl list devicetypes -j` output.
    pub fn parse_device_type_list(
        json: &[u8],
    ) -> Result<Vec<SimulatorDeviceType>, SimctlError> {
        let list: DeviceTypeList = serde_json::from_slice(json)?;
        Ok(list.devicetypes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Sample JSON matching actual simctl output format
    const SAMPLE_DEVICE_LIST: &str = r#"{
        "devices": {
            "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
                {
                    "udid": "6E7C132B-441A-43B5-AE7C-90C9B6D01730",
                    "name": "iPhone 15",
                    "state": "Booted",
                    "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.iPhone-15"
                },
                {
                    "udid": "0A2F9CDE-8A31-4A52-9A6B-31C6F2E40D11",
                    "name": "iPad Air 11-inch (M2)",
                    "state": "Shutdown",
                    "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.iPad-Air-11-inch-M2"
                }
            ],
            "com.apple.CoreSimulator.SimRuntime.watchOS-10-2": [
                {
                    "udid": "D4F1B5A0-52E3-4B77-8F35-1D9E0A6C4F22",
                    "name": "Apple Watch Series 9 (45mm)",
                    "state": "Creating",
                    "deviceTypeIdentifier": "com.apple.CoreSimulator.SimDeviceType.Apple-Watch-Series-9-45mm"
                }
            ]
        }
    }"#;

    const SAMPLE_RUNTIME_LIST: &str = r#"{
        "runtimes": [
            {
                "identifier": "com.apple.CoreSimulator.SimRuntime.iOS-17-2",
                "name": "iOS 17.2",
                "version": "17.2",
                "isAvailable": true
            },
            {
                "identifier": "com.apple.CoreSimulator.SimRuntime.iOS-15-5",
                "name": "iOS 15.5",
                "version": "15.5",
                "isAvailable": false
            },
            {
                "identifier": "com.apple.CoreSimulator.SimRuntime.watchOS-10-2",
                "name": "watchOS 10.2",
                "version": "10.2",
                "availability": "(available)"
            },
            {
                "identifier": "com.apple.CoreSimulator.SimRuntime.tvOS-16-4",
                "name": "tvOS 16.4",
                "version": "16.4",
                "availability": "(unavailable, runtime profile not found)"
            }
        ]
    }"#;

    const SAMPLE_DEVICE_TYPE_LIST: &str = r#"{
        "devicetypes": [
            {
                "identifier": "com.apple.CoreSimulator.SimDeviceType.iPhone-15",
                "name": "iPhone 15"
            },
            {
                "identifier": "com.apple.CoreSimulator.SimDeviceType.Apple-TV-4K-3rd-generation-4K",
                "name": "Apple TV 4K (3rd generation)"
            }
        ]
    }"#;

    #[test]
    fn parse_device_list_flattens_runtimes() {
        let devices = Simctl::parse_device_list(SAMPLE_DEVICE_LIST.as_bytes())
            .expect("Should parse valid JSON");

        assert_eq!(devices.len(), 3);
        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"iPhone 15"));
        assert!(names.contains(&"iPad Air 11-inch (M2)"));
        assert!(names.contains(&"Apple Watch Series 9 (45mm)"));
    }

    #[test]
    fn parse_device_list_empty() {
        let devices = Simctl::parse_device_list(br#"{"devices": {}}"#)
            .expect("Should parse empty device list");
        assert!(devices.is_empty());
    }

    #[test]
    fn parse_device_list_invalid_json() {
        let result = Simctl::parse_device_list(b"not valid json");
        assert!(matches!(result, Err(SimctlError::JsonParse(_))));
    }

    #[test]
    fn parse_device_list_missing_devices_key() {
        let result = Simctl::parse_device_list(br#"{"something_else": []}"#);
        assert!(result.is_err());
    }

    #[test]
    fn device_is_running_for_non_shutdown_states() {
        let devices = Simctl::parse_device_list(SAMPLE_DEVICE_LIST.as_bytes()).unwrap();

        let booted = devices.iter().find(|d| d.state == "Booted").unwrap();
        let creating = devices.iter().find(|d| d.state == "Creating").unwrap();
        let shutdown = devices.iter().find(|d| d.state == "Shutdown").unwrap();

        assert!(booted.is_running());
        assert!(creating.is_running());
        assert!(!shutdown.is_running());
    }

    #[test]
    fn device_without_device_type_still_parses() {
        let json = r#"{
            "devices": {
                "com.apple.CoreSimulator.SimRuntime.iOS-17-2": [
                    {
                        "udid": "test-udid",
                        "name": "Test Device",
                        "state": "Shutdown"
                    }
                ]
            }
        }"#;

        let devices = Simctl::parse_device_list(json.as_bytes()).unwrap();
        assert_eq!(devices.len(), 1);
        assert!(devices[0].device_type.is_none());
    }

    #[test]
    fn parse_runtime_list_fields() {
        let runtimes = Simctl::parse_runtime_list(SAMPLE_RUNTIME_LIST.as_bytes()).unwrap();

        assert_eq!(runtimes.len(), 4);
        assert_eq!(
            runtimes[0].identifier,
            "com.apple.CoreSimulator.SimRuntime.iOS-17-2"
        );
        assert_eq!(runtimes[0].name.as_deref(), Some("iOS 17.2"));
        assert_eq!(runtimes[0].version.as_deref(), Some("17.2"));
    }

    #[test]
    fn runtime_availability_modern_flag() {
        let runtimes = Simctl::parse_runtime_list(SAMPLE_RUNTIME_LIST.as_bytes()).unwrap();

        assert!(runtimes[0].is_available());
        assert!(!runtimes[1].is_available());
    }

    #[test]
    fn runtime_availability_legacy_string() {
        let runtimes = Simctl::parse_runtime_list(SAMPLE_RUNTIME_LIST.as_bytes()).unwrap();

        assert!(runtimes[2].is_available());
        assert!(!runtimes[3].is_available());
    }

    #[test]
    fn runtime_without_availability_fields_is_unavailable() {
        let json = r#"{"runtimes": [{"identifier": "com.apple.CoreSimulator.SimRuntime.iOS-17-2"}]}"#;
        let runtimes = Simctl::parse_runtime_list(json.as_bytes()).unwrap();
        assert!(!runtimes[0].is_available());
    }

    #[test]
    fn parse_device_type_list_fields() {
        let types = Simctl::parse_device_type_list(SAMPLE_DEVICE_TYPE_LIST.as_bytes()).unwrap();

        assert_eq!(types.len(), 2);
        assert_eq!(types[0].name, "iPhone 15");
        assert_eq!(
            types[1].identifier,
            "com.apple.CoreSimulator.SimDeviceType.Apple-TV-4K-3rd-generation-4K"
        );
    }

    #[test]
    fn error_display() {
        let err = SimctlError::CommandFailed("boom".to_string());
        assert!(err.to_string().contains("boom"));
    }

    // -- macOS-only live simctl tests ---------------------------------------

    #[cfg(target_os = "macos")]
    mod macos_tests {
        use super::*;

        #[test]
        fn shutdown_invalid_udid_fails() {
            let result = Simctl::shutdown("invalid-udid-that-does-not-exist");
            assert!(result.is_err());
        }

        #[test]
        fn delete_invalid_udid_fails() {
            let result = Simctl::delete("invalid-udid-that-does-not-exist");
            assert!(result.is_err());
        }

        #[test]
        fn create_with_bogus_pairing_fails_with_output() {
            let result = Simctl::create(
                "simfleet test device",
                "com.apple.CoreSimulator.SimDeviceType.Bogus",
                "com.apple.CoreSimulator.SimRuntime.Bogus-1-0",
            );
            match result {
                Err(SimctlError::CommandFailed(output)) => assert!(!output.is_empty()),
                other => panic!("Expected CommandFailed, got: {:?}", other),
            }
        }
    }
}
