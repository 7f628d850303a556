//! Device discovery and exclusive-access bookkeeping (component C7).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use itertools::Itertools;

use crate::device::{Device, DeliverySystemTally, DvbDevice, FrontendId};
use crate::device_data::DeliverySystemId;
use crate::error::GatewayError;

/// How a [`Registry`] was populated.
pub enum EnumerationMode {
    /// Scan `/dev/dvb` (or `root`, for tests) for real frontend devices.
    RealHardware { root: PathBuf },
    /// Synthesize two dummy adapters with no backing hardware, the way the
    /// original gateway's `SIMU` build flag did, for development without a
    /// tuner attached.
    Simulation,
    /// A single child-process source standing in for a tuner.
    ChildPipe {
        executable: PathBuf,
        advertise_as: DeliverySystemId,
    },
}

struct RegistryEntry {
    frontend_id: FrontendId,
    claimed: AtomicBool,
    device: Mutex<Box<dyn Device>>,
}

/// An append-only collection of devices discovered at startup. Devices are
/// claimed for the duration of a streaming session and released when it
/// ends; the registry itself never mutates its device list afterwards.
pub struct Registry {
    entries: Vec<RegistryEntry>,
}

/// RAII handle returned by [`Registry::claim`]; the device is released
/// back to the pool when this is dropped.
pub struct ClaimedDevice<'a> {
    entry: &'a RegistryEntry,
    guard: std::sync::MutexGuard<'a, Box<dyn Device>>,
}

impl<'a> std::ops::Deref for ClaimedDevice<'a> {
    type Target = dyn Device + 'a;
    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

impl<'a> std::ops::DerefMut for ClaimedDevice<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut **self.guard
    }
}

impl<'a> Drop for ClaimedDevice<'a> {
    fn drop(&mut self) {
        self.entry.claimed.store(false, Ordering::Release);
    }
}

impl Registry {
    fn from_devices(devices: Vec<Box<dyn Device>>) -> Self {
        let entries = devices
            .into_iter()
            .map(|device| RegistryEntry {
                frontend_id: device.frontend_id(),
                claimed: AtomicBool::new(false),
                device: Mutex::new(device),
            })
            .collect();
        Registry { entries }
    }

    pub fn enumerate(mode: EnumerationMode) -> anyhow::Result<Self> {
        match mode {
            EnumerationMode::RealHardware { root } => Self::enumerate_hardware(&root),
            EnumerationMode::Simulation => Ok(Self::enumerate_simulation()),
            EnumerationMode::ChildPipe { executable, advertise_as } => {
                Ok(Self::from_devices(vec![Box::new(
                    crate::device::ChildPipeDevice::new(
                        FrontendId { adapter: 0, frontend: 0 },
                        executable,
                        advertise_as,
                    ),
                )]))
            }
        }
    }

    /// Walks `root` (normally `/dev/dvb`) for `adapterN/frontendM` device
    /// nodes, in the same alphabetical, recursive order the original
    /// scanner used so adapter numbering stays stable across runs.
    fn enumerate_hardware(root: &Path) -> anyhow::Result<Self> {
        let adapters: Vec<(u32, PathBuf)> = std::fs::read_dir(root)
            .into_iter()
            .flatten()
            .filter_map(|e| e.ok())
            .filter_map(|entry| {
                let num: u32 = entry.file_name().to_string_lossy().strip_prefix("adapter")?.parse().ok()?;
                Some((num, entry.path()))
            })
            .sorted_by_key(|(num, _)| *num)
            .dedup_by(|a, b| a.0 == b.0)
            .collect();

        let mut devices: Vec<Box<dyn Device>> = Vec::new();
        for (adapter_num, adapter_path) in adapters {
            let frontends: Vec<u32> = std::fs::read_dir(&adapter_path)
                .into_iter()
                .flatten()
                .filter_map(|e| e.ok())
                .filter_map(|entry| entry.file_name().to_string_lossy().strip_prefix("frontend")?.parse().ok())
                .sorted()
                .dedup()
                .collect();

            for frontend_num in frontends {
                match DvbDevice::open(adapter_num, frontend_num) {
                    Ok(device) => devices.push(Box::new(device)),
                    Err(e) => {
                        log::warn!(
                            "skipping adapter {} frontend {}: {:#}",
                            adapter_num,
                            frontend_num,
                            e
                        );
                    }
                }
            }
        }

        Ok(Self::from_devices(devices))
    }

    fn enumerate_simulation() -> Self {
        // Two dummy entries, mirroring the original SIMU build's fixed
        // pair of fake adapters. There is no backing hardware to open, so
        // simulated devices are represented as child-pipe sources that
        // simply never spawn a process until tuned, which keeps this path
        // free of DvbDevice's ioctl assumptions.
        let devices: Vec<Box<dyn Device>> = (0..2)
            .map(|adapter| {
                Box::new(crate::device::ChildPipeDevice::new(
                    FrontendId { adapter, frontend: 0 },
                    PathBuf::from("/bin/false"),
                    DeliverySystemId::DvbS2,
                )) as Box<dyn Device>
            })
            .collect();
        Self::from_devices(devices)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn frontend_ids(&self) -> Vec<FrontendId> {
        self.entries.iter().map(|e| e.frontend_id).collect()
    }

    /// Attempts to exclusively claim the device at `id`. Fails with
    /// [`GatewayError::NoSuchFrontend`] if no such device exists, or
    /// [`GatewayError::AlreadyClaimed`] if another session currently holds
    /// it.
    pub fn claim(&self, id: FrontendId) -> Result<ClaimedDevice<'_>, GatewayError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.frontend_id == id)
            .ok_or(GatewayError::NoSuchFrontend { adapter: id.adapter, frontend: id.frontend })?;
        if entry.claimed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(GatewayError::AlreadyClaimed);
        }
        let guard = entry.device.lock().unwrap_or_else(|p| p.into_inner());
        Ok(ClaimedDevice { entry, guard })
    }

    /// Fleet-wide capability tally across every registered device,
    /// regardless of whether it is currently claimed.
    pub fn count_delivery_systems(&self) -> DeliverySystemTally {
        let mut tally = DeliverySystemTally::default();
        for entry in &self.entries {
            if let Ok(device) = entry.device.lock() {
                device.add_delivery_system_count(&mut tally);
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_mode_creates_two_devices() {
        let registry = Registry::enumerate(EnumerationMode::Simulation).unwrap();
        assert_eq!(registry.len(), 2);
        let ids = registry.frontend_ids();
        assert!(ids.contains(&FrontendId { adapter: 0, frontend: 0 }));
        assert!(ids.contains(&FrontendId { adapter: 1, frontend: 0 }));
    }

    #[test]
    fn claim_is_exclusive() {
        let registry = Registry::enumerate(EnumerationMode::Simulation).unwrap();
        let id = registry.frontend_ids()[0];
        let first = registry.claim(id);
        assert!(first.is_ok());
        let second = registry.claim(id);
        assert!(
            matches!(second, Err(GatewayError::AlreadyClaimed)),
            "a claimed device must not be claimable again"
        );
        drop(first);
        assert!(registry.claim(id).is_ok(), "releasing must allow reclaiming");
    }

    #[test]
    fn claim_unknown_frontend_returns_not_found() {
        let registry = Registry::enumerate(EnumerationMode::Simulation).unwrap();
        assert!(matches!(
            registry.claim(FrontendId { adapter: 99, frontend: 99 }),
            Err(GatewayError::NoSuchFrontend { .. })
        ));
    }
}
