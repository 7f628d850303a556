//! Device abstraction (component C6): one tunable source, whether it is
//! real DVB hardware or a child process standing in for one.

mod childpipe;
mod dvb;

pub use childpipe::ChildPipeDevice;
pub use dvb::DvbDevice;

use std::fmt;

use crate::buffer::PacketBuffer;
use crate::device_data::DeliverySystemId;

/// Identifies a device the way SAT&gt;IP clients address it: adapter and
/// frontend index for real hardware, a synthetic pair for everything
/// else.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FrontendId {
    pub adapter: u32,
    pub frontend: u32,
}

impl fmt::Display for FrontendId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.adapter, self.frontend)
    }
}

/// Running tally of delivery systems available across a fleet of devices,
/// used to build the SAT&gt;IP `SATIPCAP`/`fe=` capability line.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeliverySystemTally {
    pub dvbs2: u32,
    pub dvbt: u32,
    pub dvbt2: u32,
    pub dvbc: u32,
    pub dvbc2: u32,
}

impl DeliverySystemTally {
    pub fn add(&mut self, id: DeliverySystemId) {
        match id {
            // DVB-S receivers are always also DVB-S2 capable in practice;
            // SAT>IP capability advertisement counts the superset only.
            DeliverySystemId::DvbS | DeliverySystemId::DvbS2 => self.dvbs2 += 1,
            DeliverySystemId::DvbT => self.dvbt += 1,
            DeliverySystemId::DvbT2 => self.dvbt2 += 1,
            DeliverySystemId::DvbC => self.dvbc += 1,
            DeliverySystemId::DvbC2 => self.dvbc2 += 1,
            // A bare ChildPipe/Undefined tag is never advertised as such;
            // by the time a device contributes to the tally it has already
            // resolved to the system its `Transform` advertises.
            DeliverySystemId::ChildPipe | DeliverySystemId::Undefined => {}
        }
    }
}

/// One tunable, streamable source.
///
/// Implementations are not required to be `Sync`; the registry hands out
/// exclusive access per session (see [`crate::registry::Registry`]).
pub trait Device: Send {
    fn frontend_id(&self) -> FrontendId;

    /// Folds this device's supported delivery system(s) into `tally`.
    fn add_delivery_system_count(&self, tally: &mut DeliverySystemTally);

    /// Whether this device can serve the requested delivery system at all.
    fn capable_of(&self, system: DeliverySystemId) -> bool;

    /// Whether this device's transform (if any) would accept a request for
    /// `system`, independent of `capable_of`'s hardware-capability check.
    /// Devices with no transform accept anything `capable_of` already
    /// allows.
    fn capable_to_transform(&self, system: DeliverySystemId) -> bool {
        self.capable_of(system)
    }

    /// Consumes a SAT&gt;IP query string, updating tuning parameters and/or
    /// the selected PID set. Does not itself retune; call `update` next.
    fn parse_stream_string(&mut self, params: &str) -> anyhow::Result<()>;

    /// True if a non-PID tuning parameter changed since the last `update`.
    fn has_device_data_changed(&self) -> bool;

    /// Re-applies pending tuning/PID changes: retunes the frontend if the
    /// tuning parameters changed, then reconciles the PID filter set.
    /// Returns whether the frontend is (still) locked afterwards.
    fn update(&mut self) -> bool;

    /// Refreshes and returns whether the frontend currently reports a
    /// lock. Cheaper than `update`; does not retune or touch PID filters.
    fn monitor_signal(&mut self) -> bool;

    /// Releases hardware resources (PID filters, DVR handle) without
    /// closing the frontend/demux devices themselves.
    fn teardown(&mut self);

    /// Polls whether a TS packet can be read without blocking.
    fn is_data_available(&mut self) -> bool;

    /// Reads as much as fits into `buffer`'s remaining capacity, applying
    /// the PID filter and PCR-pacing bookkeeping along the way. Returns
    /// `true` if `buffer` became full (or was explicitly flushed).
    fn read_full_ts_packet(&mut self, buffer: &mut PacketBuffer) -> bool;

    /// Human-readable signal/lock description for status endpoints,
    /// following `FeStatus`'s `"LOCK ... | Signal ...dBm (...%) | ..."`
    /// formatting where signal quality is available.
    fn attribute_describe_string(&self) -> String;

    /// Serializes current tuning state as SAT&gt;IP status XML fragments.
    /// The default implementation emits nothing; only devices that keep
    /// state an operator needs to inspect override it.
    fn to_xml(&self, _out: &mut String) {}

    /// Restores state previously produced by `to_xml`, best-effort.
    fn from_xml(&mut self, _xml: &str) {}
}
