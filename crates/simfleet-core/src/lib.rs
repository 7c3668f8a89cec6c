//! # simfleet-core
//!
//! Core library for resetting the local iOS Simulator fleet.
//!
//! A fleet reset tears everything down and reprovisions from scratch:
//! running Simulator UI processes are killed, every device record is
//! shut down and deleted, and one fresh simulator is created per
//! (device type, available runtime) pairing. The typical trigger is an
//! Xcode version switch leaving the CoreSimulator backend with stale
//! devices and a wedged Simulator.app.
//!
//! ## Modules
//!
//! - [`simctl`] - Wrapper around Apple's `xcrun simctl` CLI
//! - [`platform`] - Platform classification over CoreSimulator identifiers
//! - [`process`] - Simulator UI process presence checks and signaling
//! - [`reset`] - The fleet reset orchestrator
//!
//! ## External Dependencies
//!
//! Xcode must be installed for `xcrun simctl` to be available; process
//! control uses the standard `pgrep`/`pkill`/`ps` tools.
//!
//! ## Example
//!
//! ```no_run
//! use simfleet_core::reset::{FleetReset, ResetConfig};
//!
//! let summary = FleetReset::new(ResetConfig::default()).run()?;
//! println!(
//!     "deleted {}, created {} ({} failed)",
//!     summary.deleted, summary.created, summary.failed_creations
//! );
//! # Ok::<(), simfleet_core::reset::ResetError>(())
//! ```

pub mod platform;
pub mod process;
pub mod reset;
pub mod simctl;
