//! Platform classification for simulator runtimes and device types.
//!
//! CoreSimulator encodes the target platform inside its identifiers
//! rather than exposing it as a field, so both runtimes and device types
//! have to be classified by inspecting the identifier string. The set of
//! platforms this tool provisions is closed: a runtime whose identifier
//! names anything else is simply never paired with a device type.

use std::fmt;

/// Prefix shared by every CoreSimulator runtime identifier.
const RUNTIME_IDENTIFIER_PREFIX: &str = "com.apple.CoreSimulator.SimRuntime.";

/// A simulator target platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Platform {
    Ios,
    WatchOs,
    TvOs,
}

impl Platform {
    /// Classifies a device type by its identifier.
    ///
    /// Watch hardware identifiers contain "Watch" and TV hardware
    /// identifiers contain "TV"; everything else (iPhone, iPad, iPod)
    /// is an iOS device.
    pub fn for_device_type(identifier: &str) -> Platform {
        if identifier.contains("Watch") {
            Platform::WatchOs
        } else if identifier.contains("TV") {
            Platform::TvOs
        } else {
            Platform::Ios
        }
    }

    /// Extracts the platform from a runtime identifier of the form
    /// `com.apple.CoreSimulator.SimRuntime.<Platform>-<Version>`.
    ///
    /// Returns `None` for malformed identifiers and for platforms
    /// outside the provisioned set (e.g. xrOS).
    pub fn for_runtime(identifier: &str) -> Option<Platform> {
        let rest = identifier.strip_prefix(RUNTIME_IDENTIFIER_PREFIX)?;
        let name = rest.split('-').next()?;
        match name {
            "iOS" => Some(Platform::Ios),
            "watchOS" => Some(Platform::WatchOs),
            "tvOS" => Some(Platform::TvOs),
            _ => None,
        }
    }

    /// The platform name as CoreSimulator spells it.
    pub fn name(self) -> &'static str {
        match self {
            Platform::Ios => "iOS",
            Platform::WatchOs => "watchOS",
            Platform::TvOs => "tvOS",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
