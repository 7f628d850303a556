#![allow(dead_code)]

#[macro_use]
extern crate anyhow;

pub mod buffer;
pub mod ca;
pub mod delivery;
pub mod device;
pub mod device_data;
pub mod dmx;
pub mod error;
pub mod fe;
pub mod pid_table;
pub mod registry;
pub mod transform;
pub mod xml;

pub use buffer::PacketBuffer;
pub use ca::{CaObserver, NullCaObserver};
pub use device::{ChildPipeDevice, DeliverySystemTally, Device, DvbDevice, FrontendId};
pub use device_data::{DeliverySystemId, DeviceData, Polarization, StreamProperties};
pub use dmx::DmxDevice;
pub use error::GatewayError;
pub use fe::{FeDevice, FeStatus};
pub use pid_table::FilterData;
pub use registry::{EnumerationMode, Registry};
pub use transform::{ChildPipeTransform, IdentityTransform, Transform};
