//! Fleet reset orchestration.
//!
//! Drives the full reset sequence against the local simulator fleet:
//!
//! 1. Kill every running Simulator UI process
//! 2. Wait for CoreSimulatorService to answer listing queries
//! 3. Delete unavailable simulators
//! 4. Shut down every running device (retried, with backoff)
//! 5. Delete every device
//! 6. Recreate one simulator per (device type, available runtime) pair
//!
//! Individual shutdown and create failures are logged and skipped;
//! everything else aborts the run. On a fatal error the process table
//! and the full simctl listing are dumped to stdout before the error
//! propagates, since the usual cause (a half-switched Xcode install) is
//! much easier to diagnose with that state in hand.
//!
//! # Example
//!
//! ```no_run
//! use simfleet_core::reset::{FleetReset, ResetConfig};
//!
//! let summary = FleetReset::new(ResetConfig::default()).run().unwrap();
//! println!("deleted {}, created {}", summary.deleted, summary.created);
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform::Platform;
use crate::process::SimulatorProcesses;
use crate::simctl::{
    Simctl, SimctlError, SimulatorDevice, SimulatorDeviceType, SimulatorRuntime,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a fleet reset run.
///
/// The retry bounds exist so that a wedged backend produces a fatal
/// timeout error instead of an infinite loop.
#[derive(Debug, Clone)]
pub struct ResetConfig {
    /// Maximum kill passes against Simulator UI processes.
    pub process_kill_attempts: u32,
    /// Maximum CoreSimulatorService readiness probes.
    pub service_wait_attempts: u32,
    /// Delay between readiness probes.
    pub service_wait_interval: Duration,
    /// Maximum passes of the device shutdown loop.
    pub shutdown_attempts: u32,
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            process_kill_attempts: 50,
            service_wait_attempts: 60,
            service_wait_interval: Duration::from_millis(500),
            shutdown_attempts: 6,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Fatal errors that abort a fleet reset.
#[derive(Error, Debug)]
pub enum ResetError {
    /// Simulator UI processes survived every kill pass.
    #[error("Simulator processes still running after {attempts} kill attempts")]
    ProcessKillTimeout { attempts: u32 },

    /// CoreSimulatorService never returned a usable device listing.
    #[error("CoreSimulatorService did not become ready after {attempts} attempts")]
    ServiceTimeout { attempts: u32 },

    /// `simctl delete unavailable` failed.
    #[error("Failed to delete unavailable simulators: {0}")]
    PurgeFailed(SimctlError),

    /// Deleting a specific simulator failed.
    #[error("Failed to delete simulator {udid}: {source}")]
    DeleteFailed { udid: String, source: SimctlError },

    /// A simctl listing query failed outside the readiness wait.
    #[error(transparent)]
    Simctl(#[from] SimctlError),

    /// A process-control subprocess could not be spawned.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Counts reported by a successful reset run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetSummary {
    /// Devices deleted during the teardown phase.
    pub deleted: usize,
    /// Simulators created during the recreation phase.
    pub created: usize,
    /// (device type, runtime) pairs whose creation failed and was skipped.
    pub failed_creations: usize,
}

/// One planned `simctl create` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationSpec {
    /// Simulator name; the device type's display name.
    pub name: String,
    /// Device type identifier.
    pub device_type: String,
    /// Runtime identifier.
    pub runtime: String,
}

// ---------------------------------------------------------------------------
// Pure helpers
// ---------------------------------------------------------------------------

/// Returns the devices that are not fully shut down.
pub fn running_devices(devices: &[SimulatorDevice]) -> Vec<&SimulatorDevice> {
    devices.iter().filter(|d| d.is_running()).collect()
}

/// Groups available runtimes by their platform, preserving listing order
/// within each platform.
///
/// Unavailable runtimes and runtimes for platforms outside
/// [`Platform`]'s closed set are skipped; no device type ever maps to
/// the latter, so they could never produce a simulator anyway.
pub fn group_runtimes_by_platform(
    runtimes: &[SimulatorRuntime],
) -> BTreeMap<Platform, Vec<&SimulatorRuntime>> {
    let mut grouped: BTreeMap<Platform, Vec<&SimulatorRuntime>> = BTreeMap::new();
    for runtime in runtimes {
        if !runtime.is_available() {
            continue;
        }
        let Some(platform) = Platform::for_runtime(&runtime.identifier) else {
            debug!(identifier = %runtime.identifier, "Skipping runtime for unrecognized platform");
            continue;
        };
        grouped.entry(platform).or_default().push(runtime);
    }
    grouped
}

/// Expands every (device type, compatible runtime) pair into a creation
/// plan, in device type order with runtimes in listing order.
///
/// No de-duplication: two runtimes on the same platform yield two
/// simulators per device type.
pub fn plan_creations(
    device_types: &[SimulatorDeviceType],
    runtimes_by_platform: &BTreeMap<Platform, Vec<&SimulatorRuntime>>,
) -> Vec<CreationSpec> {
    let mut plan = Vec::new();
    for device_type in device_types {
        let platform = Platform::for_device_type(&device_type.identifier);
        let Some(runtimes) = runtimes_by_platform.get(&platform) else {
            continue;
        };
        for runtime in runtimes {
            plan.push(CreationSpec {
                name: device_type.name.clone(),
                device_type: device_type.identifier.clone(),
                runtime: runtime.identifier.clone(),
            });
        }
    }
    plan
}

// ---------------------------------------------------------------------------
// Loop drivers
// ---------------------------------------------------------------------------
//
// Each retry loop keeps its counters local and takes its effects as
// closures, so the bounds and backoff are testable without a simulator
// backend behind them.

fn drive_kill_loop(
    max_attempts: u32,
    mut any_running: impl FnMut() -> std::io::Result<bool>,
    mut kill_pass: impl FnMut() -> std::io::Result<()>,
) -> Result<(), ResetError> {
    for _ in 0..max_attempts {
        if !any_running()? {
            return Ok(());
        }
        kill_pass()?;
    }

    if any_running()? {
        Err(ResetError::ProcessKillTimeout {
            attempts: max_attempts,
        })
    } else {
        Ok(())
    }
}

fn drive_service_wait(
    max_attempts: u32,
    interval: Duration,
    mut probe: impl FnMut() -> Result<String, SimctlError>,
    mut sleep: impl FnMut(Duration),
) -> Result<(), ResetError> {
    for _ in 0..max_attempts {
        match probe() {
            Ok(listing) if !listing.trim().is_empty() => return Ok(()),
            Ok(_) => debug!("Device listing empty, service not ready"),
            // The service throws transient errors right after an Xcode
            // version switch; treat them the same as an empty listing.
            Err(e) => debug!(error = %e, "Device listing failed, service not ready"),
        }
        sleep(interval);
    }

    Err(ResetError::ServiceTimeout {
        attempts: max_attempts,
    })
}

/// Runs the shutdown loop and returns the devices from the last fetch.
///
/// Exhausting the attempts with devices still running is deliberately
/// not fatal: deletion proceeds against the last listing regardless,
/// matching long-standing behavior of this reset flow.
fn drive_shutdown_loop(
    max_attempts: u32,
    mut list: impl FnMut() -> Result<Vec<SimulatorDevice>, SimctlError>,
    mut shutdown: impl FnMut(&SimulatorDevice) -> Result<(), SimctlError>,
    mut sleep: impl FnMut(Duration),
) -> Result<Vec<SimulatorDevice>, SimctlError> {
    let mut all_devices = Vec::new();

    for attempt in 0..max_attempts {
        // Fresh listing each pass; devices may still be booting or
        // mid-creation and change state underneath us.
        all_devices = list()?;
        let running = running_devices(&all_devices);
        if running.is_empty() {
            return Ok(all_devices);
        }

        for device in running {
            info!(udid = %device.udid, state = %device.state, "Shutting down simulator");
            if let Err(e) = shutdown(device) {
                warn!(udid = %device.udid, error = %e, "Failed to shut down simulator");
            }
        }

        if attempt > 0 {
            sleep(Duration::from_secs(u64::from(attempt)));
        }
    }

    let still_running = running_devices(&all_devices).len();
    if still_running > 0 {
        warn!(
            count = still_running,
            "Devices still not shut down after {} attempts, deleting anyway", max_attempts
        );
    }
    Ok(all_devices)
}

/// Works through a creation plan, counting successes and failures.
///
/// A failed pairing is logged with the full command output and never
/// stops the remaining pairings.
fn drive_creation(
    plan: &[CreationSpec],
    mut create: impl FnMut(&CreationSpec) -> Result<(), SimctlError>,
) -> (usize, usize) {
    let mut created = 0;
    let mut failed = 0;

    for spec in plan {
        match create(spec) {
            Ok(()) => created += 1,
            Err(e) => {
                failed += 1;
                warn!(
                    device_type = %spec.device_type,
                    runtime = %spec.runtime,
                    "Failed to create simulator"
                );
                let output = match &e {
                    SimctlError::CommandFailed(output) => output.clone(),
                    other => other.to_string(),
                };
                for line in output.lines() {
                    warn!("    {}", line);
                }
            }
        }
    }

    (created, failed)
}

// ---------------------------------------------------------------------------
// FleetReset
// ---------------------------------------------------------------------------

/// Orchestrates a full reset of the local simulator fleet.
pub struct FleetReset {
    config: ResetConfig,
}

impl FleetReset {
    /// Creates an orchestrator with the given configuration.
    pub fn new(config: ResetConfig) -> Self {
        Self { config }
    }

    /// Runs the full reset sequence.
    ///
    /// On a fatal error the process table and full simctl listing are
    /// dumped to stdout before the error is returned.
    ///
    /// # Errors
    ///
    /// Any [`ResetError`]; see the variant docs for which phase each
    /// comes from.
    pub fn run(&self) -> Result<ResetSummary, ResetError> {
        match self.run_phases() {
            Ok(summary) => Ok(summary),
            Err(e) => {
                dump_diagnostics();
                Err(e)
            }
        }
    }

    fn run_phases(&self) -> Result<ResetSummary, ResetError> {
        self.terminate_existing_processes()?;
        self.wait_for_backend_ready()?;
        self.purge_unavailable()?;
        let devices = self.shutdown_all()?;
        self.delete_all(&devices)?;
        let (created, failed_creations) = self.recreate_fleet()?;

        Ok(ResetSummary {
            deleted: devices.len(),
            created,
            failed_creations,
        })
    }

    /// Kills Simulator UI processes left over from whatever Xcode
    /// version ran last.
    fn terminate_existing_processes(&self) -> Result<(), ResetError> {
        info!("Killing running Simulator processes");
        drive_kill_loop(
            self.config.process_kill_attempts,
            SimulatorProcesses::any_running,
            SimulatorProcesses::kill_pass,
        )
    }

    /// Polls the device listing until CoreSimulatorService answers.
    fn wait_for_backend_ready(&self) -> Result<(), ResetError> {
        info!("Waiting for CoreSimulatorService");
        drive_service_wait(
            self.config.service_wait_attempts,
            self.config.service_wait_interval,
            Simctl::probe_device_listing,
            std::thread::sleep,
        )
    }

    fn purge_unavailable(&self) -> Result<(), ResetError> {
        info!("Deleting unavailable simulators");
        Simctl::delete_unavailable().map_err(ResetError::PurgeFailed)
    }

    /// Shuts down every running device, returning the last listing for
    /// the deletion phase.
    fn shutdown_all(&self) -> Result<Vec<SimulatorDevice>, ResetError> {
        let devices = drive_shutdown_loop(
            self.config.shutdown_attempts,
            Simctl::list_devices,
            |device| Simctl::shutdown(&device.udid),
            std::thread::sleep,
        )?;
        Ok(devices)
    }

    fn delete_all(&self, devices: &[SimulatorDevice]) -> Result<(), ResetError> {
        info!(count = devices.len(), "Deleting all simulators");
        for device in devices {
            Simctl::delete(&device.udid).map_err(|e| ResetError::DeleteFailed {
                udid: device.udid.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Recreates one simulator per (device type, available runtime) pair.
    ///
    /// Returns `(created, failed)` counts. Creation failures are logged
    /// with the full command output and skipped.
    fn recreate_fleet(&self) -> Result<(usize, usize), ResetError> {
        let runtimes = Simctl::list_runtimes()?;
        let device_types = Simctl::list_device_types()?;

        let runtimes_by_platform = group_runtimes_by_platform(&runtimes);
        let plan = plan_creations(&device_types, &runtimes_by_platform);

        info!(count = plan.len(), "Creating fresh simulators");
        Ok(drive_creation(&plan, |spec| {
            Simctl::create(&spec.name, &spec.device_type, &spec.runtime)
        }))
    }
}

/// Dumps the process table and the full simctl listing to stdout.
///
/// Best-effort; failures here must not mask the error being reported.
fn dump_diagnostics() {
    info!("Dumping state for post-mortem debugging");

    match SimulatorProcesses::process_table() {
        Ok(table) => println!("{}", table),
        Err(e) => warn!(error = %e, "Could not dump process table"),
    }

    match Simctl::dump_listing() {
        Ok(listing) => println!("{}", listing),
        Err(e) => warn!(error = %e, "Could not dump simctl listing"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
