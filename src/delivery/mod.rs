//! Delivery-system tuning strategies (component C4).
//!
//! Each `DeliverySystem` knows how to turn a [`DeviceData`] into the exact
//! `DTV_*` property sequence (and, for satellite, the DiSEqC/LNB dance)
//! needed to lock a frontend. `Device` picks the implementation that
//! matches `DeviceData::msys` and delegates to it; the device itself stays
//! ignorant of modulation-specific details.

mod dvbc;
mod dvbs;
mod dvbt;

pub use dvbc::DvbC;
pub use dvbs::DvbS;
pub use dvbt::DvbT;

use crate::device_data::{DeliverySystemId, DeviceData};
use crate::fe::FeDevice;

/// A single delivery-system tuning strategy.
pub trait DeliverySystem: Send {
    fn id(&self) -> DeliverySystemId;

    /// Applies `device`'s tuning parameters to `fe` and initiates a tune.
    /// Does not wait for lock; the caller polls `fe.read_status()`.
    fn tune(&self, fe: &FeDevice, device: &DeviceData) -> anyhow::Result<()>;
}

/// Picks the `DeliverySystem` implementation for a requested msys. Returns
/// `None` for `ChildPipe`/`Undefined`, which never reach a frontend tune
/// sequence (the ChildPipe backend's `update` short-circuits before
/// calling this).
pub fn for_delivery_system(id: DeliverySystemId) -> Option<Box<dyn DeliverySystem>> {
    match id {
        DeliverySystemId::DvbT | DeliverySystemId::DvbT2 => Some(Box::new(DvbT)),
        DeliverySystemId::DvbC | DeliverySystemId::DvbC2 => Some(Box::new(DvbC)),
        DeliverySystemId::DvbS | DeliverySystemId::DvbS2 => Some(Box::new(DvbS)),
        DeliverySystemId::ChildPipe | DeliverySystemId::Undefined => None,
    }
}
